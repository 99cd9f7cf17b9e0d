use kameo::{
    actor::{Actor, ActorRef},
    error::Infallible,
    message::{Context as KameoContext, Message, StreamMessage},
};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tracing::debug;

use crate::actor::messages::{GetCurrent, PlacePixel, SendFrame, SetBrand};
use crate::actor::root::Root;
use crate::protocol::{parse_frame, ClientMessage, ServerFrame};
use crate::registry::ConnectionId;

pub struct ClientActorArgs {
    pub socket: WebSocket,
    pub root: ActorRef<Root>,
    pub connection_id: ConnectionId,
}

/// One actor per WebSocket connection. Stateless across messages apart
/// from the connection id; every frame is independently dispatched.
pub struct ClientActor {
    sink: SplitSink<WebSocket, WsMessage>,
    root: ActorRef<Root>,
    connection_id: ConnectionId,
}

impl Actor for ClientActor {
    type Args = ClientActorArgs;
    type Error = Infallible;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        let (sink, stream) = args.socket.split();
        actor_ref.attach_stream(stream, (), "ws");
        Ok(Self {
            sink,
            root: args.root,
            connection_id: args.connection_id,
        })
    }
}

impl Message<StreamMessage<Result<WsMessage, axum::Error>, (), &'static str>> for ClientActor {
    type Reply = ();

    async fn handle(&mut self, msg: StreamMessage<Result<WsMessage, axum::Error>, (), &'static str>, ctx: &mut KameoContext<Self, Self::Reply>) {
        match msg {
            StreamMessage::Next(Ok(WsMessage::Text(text))) => {
                let text = text.to_string();
                self.dispatch(&text, &ctx.actor_ref()).await;
            }
            StreamMessage::Next(Ok(WsMessage::Binary(data))) => {
                // Some clients send JSON in binary frames; route valid
                // UTF-8 through the same dispatch, anything else is a
                // transport error.
                match std::str::from_utf8(&data).map(str::to_string) {
                    Ok(text) => self.dispatch(&text, &ctx.actor_ref()).await,
                    Err(_) => {
                        self.send_error("Failed to parse message!", &ctx.actor_ref()).await;
                    }
                }
            }
            StreamMessage::Next(Ok(WsMessage::Ping(data))) => {
                if self.sink.send(WsMessage::Pong(data)).await.is_err() {
                    ctx.actor_ref().kill();
                }
            }
            StreamMessage::Next(Ok(WsMessage::Close(_))) | StreamMessage::Finished(_) => {
                ctx.actor_ref().kill();
            }
            StreamMessage::Next(Err(_)) => ctx.actor_ref().kill(),
            _ => {}
        }
    }
}

impl Message<SendFrame> for ClientActor {
    type Reply = ();

    async fn handle(&mut self, msg: SendFrame, ctx: &mut KameoContext<Self, Self::Reply>) {
        if self.sink.send(WsMessage::Text(msg.0.into())).await.is_err() {
            ctx.actor_ref().kill();
        }
    }
}

impl ClientActor {
    async fn dispatch(&mut self, text: &str, me: &ActorRef<Self>) {
        let message = match parse_frame(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(id = %self.connection_id, "bad frame: {e}");
                self.send_error(&e.to_string(), me).await;
                return;
            }
        };

        match message {
            ClientMessage::Ping => {
                self.send_frame(&ServerFrame::Pong, me).await;
            }
            ClientMessage::GetMap => {
                if let Ok(handle) = self.root.ask(GetCurrent).send().await {
                    let frame = ServerFrame::Map { data: &handle.0.map_id, reason: None };
                    self.send_frame(&frame, me).await;
                }
            }
            ClientMessage::GetOrders => {
                if let Ok(handle) = self.root.ask(GetCurrent).send().await {
                    let frame = ServerFrame::Orders { data: &handle.0.orders, reason: None };
                    self.send_frame(&frame, me).await;
                }
            }
            ClientMessage::Brand { brand } => {
                // A missing or non-string label is dropped without a reply.
                if let Some(brand) = brand {
                    let msg = SetBrand { id: self.connection_id, brand };
                    let _ = self.root.tell(msg).send().await;
                }
            }
            ClientMessage::PlacePixel { x, y, color } => {
                // Fire and forget: acceptance and rejection are both silent.
                let (Some(x), Some(y), Some(color)) = (x, y, color) else {
                    return;
                };
                let msg = PlacePixel { id: self.connection_id, x, y, color };
                let _ = self.root.tell(msg).send().await;
            }
        }
    }

    async fn send_frame(&mut self, frame: &ServerFrame<'_>, me: &ActorRef<Self>) {
        if self.sink.send(WsMessage::Text(frame.to_json().into())).await.is_err() {
            me.kill();
        }
    }

    async fn send_error(&mut self, data: &str, me: &ActorRef<Self>) {
        self.send_frame(&ServerFrame::Error { data }, me).await;
    }
}
