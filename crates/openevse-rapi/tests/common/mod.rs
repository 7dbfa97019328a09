//! Shared helpers for the RAPI integration tests.

#![allow(dead_code)]

use openevse_rapi::{Frame, ManualClock, MemoryStream, RapiConfig, RapiResult, RapiSender};
use std::cell::RefCell;
use std::rc::Rc;

/// A sender wired to an in-memory link and a manual clock, plus handles to
/// both.
pub struct Harness {
    pub sender: RapiSender<MemoryStream, ManualClock>,
    pub link: MemoryStream,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(RapiConfig::default())
    }

    pub fn with_config(config: RapiConfig) -> Self {
        let link = MemoryStream::new();
        let clock = ManualClock::new();
        let sender = RapiSender::with_clock(link.clone(), clock.clone(), config);
        Self {
            sender,
            link,
            clock,
        }
    }

    /// Queue a well-formed controller frame on the link.
    pub fn reply(&self, body: &str) {
        self.link.push_inbound(&encode(body));
    }

    /// Queue a controller frame echoing a sequence id.
    pub fn reply_with_sequence(&self, body: &str, id: u8) {
        let bytes = Frame::new(body).with_sequence_id(id).encode().unwrap();
        self.link.push_inbound(&bytes);
    }

    /// Everything the sender wrote, split into frames as text.
    pub fn written_frames(&self) -> Vec<String> {
        String::from_utf8(self.link.take_written())
            .unwrap()
            .split_terminator('\r')
            .map(str::to_string)
            .collect()
    }
}

/// Encode a frame body to wire bytes.
pub fn encode(body: &str) -> Vec<u8> {
    Frame::new(body).encode().unwrap().to_vec()
}

/// Collects completion results in call order.
#[derive(Clone, Default)]
pub struct Recorder {
    results: Rc<RefCell<Vec<(String, RapiResult)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A completion handler that records under `label`.
    pub fn callback(&self, label: &str) -> impl FnOnce(RapiResult) + 'static {
        let results = Rc::clone(&self.results);
        let label = label.to_string();
        move |result| results.borrow_mut().push((label, result))
    }

    pub fn len(&self) -> usize {
        self.results.borrow().len()
    }

    pub fn labels(&self) -> Vec<String> {
        self.results.borrow().iter().map(|(l, _)| l.clone()).collect()
    }

    pub fn result(&self, index: usize) -> RapiResult {
        self.results.borrow()[index].1.clone()
    }
}
