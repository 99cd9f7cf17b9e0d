use std::collections::HashMap;

/// One legal canvas color.
///
/// Indices are sparse on purpose: the gaps are reserved slots in the
/// upstream color table, so the index is data, not a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaletteEntry {
    pub index: u8,
    pub rgb: [u8; 3],
}

/// The fixed, ordered set of legal colors with exact and nearest lookup.
///
/// Loaded once at startup; never mutated.
#[derive(Debug, Clone)]
pub struct Palette {
    entries: Vec<PaletteEntry>,
    by_rgb: HashMap<[u8; 3], u8>,
}

impl Palette {
    pub fn new(entries: Vec<PaletteEntry>) -> Self {
        let mut by_rgb = HashMap::with_capacity(entries.len());
        for entry in &entries {
            // First declaration wins on duplicate colors.
            by_rgb.entry(entry.rgb).or_insert(entry.index);
        }
        Self { entries, by_rgb }
    }

    /// The 24-color 2022 canvas palette, sparse indices included.
    pub fn place_2022() -> Self {
        const TABLE: [(u8, [u8; 3]); 24] = [
            (1, [0xBE, 0x00, 0x39]),
            (2, [0xFF, 0x45, 0x00]),
            (3, [0xFF, 0xA8, 0x00]),
            (4, [0xFF, 0xD6, 0x35]),
            (6, [0x00, 0xA3, 0x68]),
            (7, [0x00, 0xCC, 0x78]),
            (8, [0x7E, 0xED, 0x56]),
            (9, [0x00, 0x75, 0x6F]),
            (10, [0x00, 0x9E, 0xAA]),
            (12, [0x24, 0x50, 0xA4]),
            (13, [0x36, 0x90, 0xEA]),
            (14, [0x51, 0xE9, 0xF4]),
            (15, [0x49, 0x3A, 0xC1]),
            (16, [0x6A, 0x5C, 0xFF]),
            (18, [0x81, 0x1E, 0x9F]),
            (19, [0xB4, 0x4A, 0xC0]),
            (22, [0xFF, 0x38, 0x81]),
            (23, [0xFF, 0x99, 0xAA]),
            (24, [0x6D, 0x48, 0x2F]),
            (25, [0x9C, 0x69, 0x26]),
            (27, [0x00, 0x00, 0x00]),
            (29, [0x89, 0x8D, 0x90]),
            (30, [0xD4, 0xD7, 0xD9]),
            (31, [0xFF, 0xFF, 0xFF]),
        ];
        Self::new(
            TABLE
                .iter()
                .map(|&(index, rgb)| PaletteEntry { index, rgb })
                .collect(),
        )
    }

    /// Looks up the palette index for an exact RGB match.
    pub fn resolve_exact(&self, rgb: [u8; 3]) -> Option<u8> {
        self.by_rgb.get(&rgb).copied()
    }

    /// Returns the index of the closest palette entry by squared Euclidean
    /// RGB distance. Ties go to the earliest declared entry; `None` only
    /// for an empty palette.
    pub fn resolve_nearest(&self, rgb: [u8; 3]) -> Option<u8> {
        self.entries
            .iter()
            .min_by_key(|entry| distance_sq(entry.rgb, rgb))
            .map(|entry| entry.index)
    }

    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::place_2022()
    }
}

fn distance_sq(a: [u8; 3], b: [u8; 3]) -> u32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_hit_and_miss() {
        let palette = Palette::place_2022();
        assert_eq!(palette.resolve_exact([0xBE, 0x00, 0x39]), Some(1));
        assert_eq!(palette.resolve_exact([0xFF, 0xFF, 0xFF]), Some(31));
        assert_eq!(palette.resolve_exact([1, 2, 3]), None);
    }

    #[test]
    fn nearest_of_exact_color_is_itself() {
        let palette = Palette::place_2022();
        for entry in palette.entries() {
            assert_eq!(palette.resolve_nearest(entry.rgb), Some(entry.index));
        }
    }

    #[test]
    fn nearest_always_resolves() {
        let palette = Palette::place_2022();
        // Near-black lands on black (index 27).
        assert_eq!(palette.resolve_nearest([1, 2, 3]), Some(27));
        // Near-white lands on white (index 31).
        assert_eq!(palette.resolve_nearest([0xFE, 0xFE, 0xFE]), Some(31));
    }

    #[test]
    fn nearest_tie_prefers_declaration_order() {
        let palette = Palette::new(vec![
            PaletteEntry { index: 5, rgb: [0, 0, 0] },
            PaletteEntry { index: 2, rgb: [0, 0, 20] },
        ]);
        // [0, 0, 10] is equidistant from both entries.
        assert_eq!(palette.resolve_nearest([0, 0, 10]), Some(5));
    }

    #[test]
    fn empty_palette_has_no_nearest() {
        let palette = Palette::new(Vec::new());
        assert!(palette.is_empty());
        assert_eq!(palette.resolve_nearest([0, 0, 0]), None);
    }
}
