use kameo::{
    actor::{Actor, ActorID, ActorRef, Recipient, WeakActorRef},
    error::{ActorStopReason, Infallible},
    message::{Context, Message},
};
use std::collections::HashMap;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::actor::client::{ClientActor, ClientActorArgs};
use crate::actor::messages::{
    CreateClient, GetCurrent, GetRecentHistory, GetStats, HistogramTick, InstallSnapshot,
    PlacePixel, RecentHistory, SaveState, SendFrame, SetBrand, SnapshotHandle, Stats,
};
use crate::config::CanvasConfig;
use crate::hooks::{Hook, OnConnectPayload, OnDisconnectPayload, OnMapInstalledPayload, OnSaveStatePayload};
use crate::protocol::ServerFrame;
use crate::registry::{ConnectionId, Registry};
use crate::state::{CanvasState, HistoryMeta};

/// Owns the canonical canvas state and the connection registry. Every
/// shared-state mutation funnels through this actor's mailbox, which is
/// what serializes swaps and keeps admission control atomic with the
/// placement counter.
pub struct Root {
    config: CanvasConfig,
    state: CanvasState,
    registry: Registry,
    clients: HashMap<ConnectionId, Recipient<SendFrame>>,
    by_actor: HashMap<ActorID, ConnectionId>,
    brand_usage: HashMap<String, usize>,
    hooks: Arc<Vec<Box<dyn Hook>>>,
}

pub struct RootArgs {
    pub config: CanvasConfig,
    pub hooks: Arc<Vec<Box<dyn Hook>>>,
}

impl Root {
    fn save_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.state.to_persisted()).unwrap_or_default()
    }

    async fn offer_save(&self) {
        if self.hooks.is_empty() {
            return;
        }
        let bytes = self.save_bytes();
        for hook in self.hooks.iter() {
            if let Err(e) = hook.on_save_state(OnSaveStatePayload { state: &bytes }).await {
                warn!("on_save_state hook failed: {e}");
            }
        }
    }

    fn spawn_ticker<M>(actor: ActorRef<Self>, period: std::time::Duration, make: fn() -> M)
    where
        Root: Message<M>,
        M: Send + 'static,
    {
        tokio::spawn(async move {
            let mut tick = interval(period);
            tick.tick().await; // the first tick fires immediately; skip it
            loop {
                tick.tick().await;
                if actor.tell(make()).send().await.is_err() {
                    break;
                }
            }
        });
    }
}

impl Actor for Root {
    type Args = RootArgs;
    type Error = Infallible;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        let mut state = None;
        for hook in args.hooks.iter() {
            match hook.on_load_state().await {
                Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                    Ok(persisted) => {
                        state = Some(CanvasState::from_persisted(persisted));
                        break;
                    }
                    Err(e) => warn!("persisted state was not decodable: {e}"),
                },
                Ok(None) => continue,
                Err(e) => warn!("on_load_state hook failed: {e}"),
            }
        }
        let state = state.unwrap_or_else(CanvasState::blank);
        info!(map_id = %state.current().map_id, "canvas state initialized");

        Self::spawn_ticker(actor_ref.clone(), args.config.persist_every, || SaveState);
        Self::spawn_ticker(actor_ref, args.config.histogram_every, || HistogramTick);

        Ok(Self {
            registry: Registry::new(args.config.cooldown),
            config: args.config,
            state,
            clients: HashMap::new(),
            by_actor: HashMap::new(),
            brand_usage: HashMap::new(),
            hooks: args.hooks,
        })
    }

    fn on_link_died(&mut self, _: WeakActorRef<Self>, id: ActorID, _reason: ActorStopReason) -> impl Future<Output = Result<ControlFlow<ActorStopReason>, Self::Error>> + Send {
        if let Some(conn_id) = self.by_actor.remove(&id) {
            self.clients.remove(&conn_id);
            self.registry.unregister(conn_id);
            info!(%conn_id, "client disconnected");
            let hooks = Arc::clone(&self.hooks);
            tokio::spawn(async move {
                for hook in hooks.iter() {
                    let _ = hook.on_disconnect(OnDisconnectPayload { connection_id: conn_id }).await;
                }
            });
        }
        async { Ok(ControlFlow::Continue(())) }
    }
}

impl Message<CreateClient> for Root {
    type Reply = ();

    async fn handle(&mut self, msg: CreateClient, ctx: &mut Context<Self, Self::Reply>) {
        let conn_id = self.registry.register();

        for hook in self.hooks.iter() {
            let payload = OnConnectPayload { connection_id: conn_id, request: &msg.request_info };
            if let Err(e) = hook.on_connect(payload).await {
                debug!(%conn_id, "on_connect hook rejected connection: {e}");
                self.registry.unregister(conn_id);
                return; // dropping the socket closes it
            }
        }

        info!(
            %conn_id,
            ip = msg.request_info.client_ip().unwrap_or("unknown"),
            ua = msg.request_info.user_agent(),
            "client connected"
        );

        let args = ClientActorArgs {
            socket: msg.socket,
            root: ctx.actor_ref().clone(),
            connection_id: conn_id,
        };
        let client = ClientActor::spawn_link(&ctx.actor_ref(), args).await;
        self.by_actor.insert(client.id(), conn_id);
        self.clients.insert(conn_id, client.recipient());
    }
}

impl Message<GetCurrent> for Root {
    type Reply = SnapshotHandle;

    async fn handle(&mut self, _: GetCurrent, _: &mut Context<Self, Self::Reply>) -> Self::Reply {
        SnapshotHandle(self.state.current())
    }
}

impl Message<SetBrand> for Root {
    type Reply = ();

    async fn handle(&mut self, msg: SetBrand, _: &mut Context<Self, Self::Reply>) {
        self.registry.set_brand(msg.id, &msg.brand);
    }
}

impl Message<PlacePixel> for Root {
    type Reply = bool;

    async fn handle(&mut self, msg: PlacePixel, _: &mut Context<Self, Self::Reply>) -> bool {
        let in_bounds = (0..self.config.width as i64).contains(&msg.x)
            && (0..self.config.height as i64).contains(&msg.y)
            && (0..=self.config.max_color_index as i64).contains(&msg.color);
        if !in_bounds {
            return false;
        }
        if !self.registry.try_accept_placement(msg.id, Instant::now()) {
            debug!(id = %msg.id, "placement rejected by cooldown");
            return false;
        }
        let total = self.state.increment_placed();
        info!(id = %msg.id, x = msg.x, y = msg.y, color = msg.color, total, "pixel placed");
        true
    }
}

impl Message<InstallSnapshot> for Root {
    type Reply = ();

    async fn handle(&mut self, msg: InstallSnapshot, _: &mut Context<Self, Self::Reply>) {
        let meta = HistoryMeta { reason: msg.reason, uploader: msg.uploader };
        let entry = self.state.swap(msg.snapshot, meta);
        let current = self.state.current();
        let reason = Some(entry.reason.as_str());

        info!(
            map_id = %current.map_id,
            orders = current.order_count(),
            clients = self.clients.len(),
            "snapshot installed"
        );

        let map_frame = ServerFrame::Map { data: &current.map_id, reason }.to_json();
        let orders_frame = ServerFrame::Orders { data: &current.orders, reason }.to_json();

        // Iterate a snapshot copy of the handles so connects/disconnects
        // during fan-out cannot corrupt iteration. One task per client keeps
        // map-before-orders ordering within each connection; a dead client
        // just drops its frames.
        let recipients: Vec<Recipient<SendFrame>> = self.clients.values().cloned().collect();
        for recipient in recipients {
            let map = map_frame.clone();
            let orders = orders_frame.clone();
            tokio::spawn(async move {
                let _ = recipient.tell(SendFrame(map)).send().await;
                let _ = recipient.tell(SendFrame(orders)).send().await;
            });
        }

        for hook in self.hooks.iter() {
            let payload = OnMapInstalledPayload {
                map_id: &current.map_id,
                reason: &entry.reason,
                uploader: entry.uploader.as_deref(),
                order_count: current.order_count(),
            };
            if let Err(e) = hook.on_map_installed(payload).await {
                warn!("on_map_installed hook failed: {e}");
            }
        }

        // Persist immediately after every install, on top of the periodic
        // tick.
        self.offer_save().await;
    }
}

impl Message<GetStats> for Root {
    type Reply = Stats;

    async fn handle(&mut self, _: GetStats, _: &mut Context<Self, Self::Reply>) -> Stats {
        let current = self.state.current();
        Stats {
            connection_count: self.registry.len(),
            current_map: current.map_id.clone(),
            order_count: current.order_count(),
            total_pixels_placed: self.state.total_placed(),
            map_history: self.state.recent_history(),
            brand_usage: self.brand_usage.clone(),
            date: chrono::Utc::now(),
        }
    }
}

impl Message<GetRecentHistory> for Root {
    type Reply = RecentHistory;

    async fn handle(&mut self, _: GetRecentHistory, _: &mut Context<Self, Self::Reply>) -> Self::Reply {
        RecentHistory(self.state.recent_history())
    }
}

impl Message<SaveState> for Root {
    type Reply = ();

    async fn handle(&mut self, _: SaveState, _: &mut Context<Self, Self::Reply>) {
        self.offer_save().await;
    }
}

impl Message<HistogramTick> for Root {
    type Reply = ();

    async fn handle(&mut self, _: HistogramTick, _: &mut Context<Self, Self::Reply>) {
        self.brand_usage = self.registry.brand_histogram();
        debug!(connections = self.registry.len(), brands = ?self.brand_usage, "brand usage");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CanvasSnapshot, PixelOp};
    use std::time::Duration;

    /// Registers a fake connection backed by a collector actor, so these
    /// tests can observe fan-out without a WebSocket.
    struct Register(Recipient<SendFrame>);

    impl Message<Register> for Root {
        type Reply = ConnectionId;

        async fn handle(&mut self, msg: Register, _: &mut Context<Self, Self::Reply>) -> ConnectionId {
            let conn_id = self.registry.register();
            self.clients.insert(conn_id, msg.0);
            conn_id
        }
    }

    #[derive(Default)]
    struct Collector {
        frames: Vec<String>,
    }

    struct TakeFrames;

    impl Actor for Collector {
        type Args = Self;
        type Error = Infallible;

        async fn on_start(state: Self::Args, _: ActorRef<Self>) -> Result<Self, Self::Error> {
            Ok(state)
        }
    }

    impl Message<SendFrame> for Collector {
        type Reply = ();

        async fn handle(&mut self, msg: SendFrame, _: &mut Context<Self, Self::Reply>) {
            self.frames.push(msg.0);
        }
    }

    impl Message<TakeFrames> for Collector {
        type Reply = Vec<String>;

        async fn handle(&mut self, _: TakeFrames, _: &mut Context<Self, Self::Reply>) -> Vec<String> {
            std::mem::take(&mut self.frames)
        }
    }

    fn spawn_root(config: CanvasConfig) -> ActorRef<Root> {
        Root::spawn(RootArgs { config, hooks: Arc::new(vec![]) })
    }

    async fn register(root: &ActorRef<Root>) -> (ConnectionId, ActorRef<Collector>) {
        let collector = Collector::spawn(Collector::default());
        let id = root
            .ask(Register(collector.clone().recipient()))
            .send()
            .await
            .unwrap();
        (id, collector)
    }

    #[tokio::test]
    async fn placement_is_rate_limited_and_counted() {
        let root = spawn_root(CanvasConfig::default());
        let (id, _collector) = register(&root).await;

        assert!(root.ask(PlacePixel { id, x: 5, y: 5, color: 3 }).send().await.unwrap());
        // Second intent within the cooldown: silent no-op.
        assert!(!root.ask(PlacePixel { id, x: 5, y: 5, color: 3 }).send().await.unwrap());

        let stats = root.ask(GetStats).send().await.unwrap();
        assert_eq!(stats.total_pixels_placed, 1);
        assert_eq!(stats.connection_count, 1);
    }

    #[tokio::test]
    async fn out_of_bounds_placements_never_count() {
        let config = CanvasConfig { width: 10, height: 20, ..CanvasConfig::default() };
        let root = spawn_root(config);
        let (id, _collector) = register(&root).await;

        for (x, y, color) in [(-1, 0, 0), (10, 0, 0), (0, 20, 0), (0, 0, 33), (0, 0, -1)] {
            assert!(!root.ask(PlacePixel { id, x, y, color }).send().await.unwrap());
        }
        // The rejections did not consume the cooldown.
        assert!(root.ask(PlacePixel { id, x: 9, y: 19, color: 32 }).send().await.unwrap());

        let stats = root.ask(GetStats).send().await.unwrap();
        assert_eq!(stats.total_pixels_placed, 1);
    }

    #[tokio::test]
    async fn install_broadcasts_map_then_orders_to_every_client() {
        let root = spawn_root(CanvasConfig::default());
        let (_a, collector_a) = register(&root).await;
        let (_b, collector_b) = register(&root).await;

        let snapshot = CanvasSnapshot {
            map_id: "777.png".to_string(),
            orders: vec![PixelOp { x: 1, y: 2, color: 3 }],
        };
        root.ask(InstallSnapshot {
            snapshot,
            reason: "new art".to_string(),
            uploader: Some("noah".to_string()),
        })
        .send()
        .await
        .unwrap();

        // Fan-out runs on spawned tasks; give them a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;

        for collector in [&collector_a, &collector_b] {
            let frames = collector.ask(TakeFrames).send().await.unwrap();
            assert_eq!(frames.len(), 2);
            assert!(frames[0].contains(r#""type":"map""#));
            assert!(frames[0].contains("777.png"));
            assert!(frames[0].contains("new art"));
            assert!(frames[1].contains(r#""type":"orders""#));
            assert!(frames[1].contains(r#"{"x":1,"y":2,"color":3}"#));
        }

        let current = root.ask(GetCurrent).send().await.unwrap();
        assert_eq!(current.0.map_id, "777.png");
        let history = root.ask(GetRecentHistory).send().await.unwrap().0;
        assert_eq!(history[0].map_id, "777.png");
        assert_eq!(history[0].uploader.as_deref(), Some("noah"));
    }

    #[tokio::test]
    async fn brand_feeds_the_histogram() {
        let root = spawn_root(CanvasConfig::default());
        let (a, _ca) = register(&root).await;
        let (b, _cb) = register(&root).await;

        root.ask(SetBrand { id: a, brand: "osu".to_string() }).send().await.unwrap();
        // Invalid label: silently ignored.
        root.ask(SetBrand { id: b, brand: "ab cd".to_string() }).send().await.unwrap();

        root.ask(HistogramTick).send().await.unwrap();
        let stats = root.ask(GetStats).send().await.unwrap();
        assert_eq!(stats.brand_usage.get("osu"), Some(&1));
        assert_eq!(stats.brand_usage.len(), 1);
    }
}
