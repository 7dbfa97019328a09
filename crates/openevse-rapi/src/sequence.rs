use openevse_core::constants::INVALID_SEQUENCE_ID;

/// Generator for the one-byte sequence ids that tag outbound commands.
///
/// Ids increase by one per send, wrap from 255 to 1 and never take the
/// reserved value 0. While disabled, [`SequenceGenerator::next_id`] returns
/// `None` and frames are sent untagged.
///
/// # Examples
///
/// ```
/// use openevse_rapi::SequenceGenerator;
///
/// let mut seq = SequenceGenerator::new();
/// assert_eq!(seq.next_id(), None);
///
/// seq.enable_with_seed(254);
/// assert_eq!(seq.next_id(), Some(255));
/// assert_eq!(seq.next_id(), Some(1));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SequenceGenerator {
    current: u8,
    enabled: bool,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable sequencing, seeded from the low bits of the wall clock.
    pub fn enable(&mut self) {
        let seed = chrono::Utc::now().timestamp_millis() as u8;
        self.enable_with_seed(seed);
    }

    /// Enable sequencing with a fixed starting point. The first id issued
    /// is the one after `seed`.
    pub fn enable_with_seed(&mut self, seed: u8) {
        self.current = seed;
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.current = INVALID_SEQUENCE_ID;
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The most recently issued id.
    pub fn current(&self) -> Option<u8> {
        (self.enabled && self.current != INVALID_SEQUENCE_ID).then_some(self.current)
    }

    /// Issue the next id.
    pub fn next_id(&mut self) -> Option<u8> {
        if !self.enabled {
            return None;
        }
        self.current = self.current.wrapping_add(1);
        if self.current == INVALID_SEQUENCE_ID {
            self.current = self.current.wrapping_add(1);
        }
        Some(self.current)
    }
}
