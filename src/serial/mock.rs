//! In-memory transport used by unit tests to emulate a serial device.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::port::Transport;
use crate::utils::error::SensorError;

#[derive(Debug, Clone)]
pub enum MockResponse {
    Data(Vec<u8>),
    /// Simulated link fault on read
    Fail,
}

/// Shared view of what the mock saw, kept by the test after the transport is boxed.
#[derive(Clone, Default)]
pub struct MockHandle {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    discards: Arc<Mutex<usize>>,
}

impl MockHandle {
    pub fn push_response(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_text(&self, text: &str) {
        self.push_response(MockResponse::Data(text.as_bytes().to_vec()));
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    pub fn discards(&self) -> usize {
        *self.discards.lock().unwrap()
    }
}

pub struct MockTransport {
    handle: MockHandle,
    write_delay: Duration,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        (
            Self {
                handle: handle.clone(),
                write_delay: Duration::ZERO,
            },
            handle,
        )
    }

    /// Slows every write so concurrent callers get a chance to interleave.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }
}

impl Transport for MockTransport {
    fn write_all(&mut self, data: &[u8]) -> Result<(), SensorError> {
        if !self.write_delay.is_zero() {
            std::thread::sleep(self.write_delay);
        }
        self.handle.writes.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read_up_to(&mut self, max: usize) -> Result<Vec<u8>, SensorError> {
        match self.handle.responses.lock().unwrap().pop_front() {
            Some(MockResponse::Data(mut data)) => {
                data.truncate(max);
                Ok(data)
            }
            Some(MockResponse::Fail) => Err(SensorError::CommunicationError("Simulated read error".to_string())),
            // Nothing queued behaves like a silent device: the read times out empty.
            None => Ok(Vec::new()),
        }
    }

    fn discard_input(&mut self) -> Result<(), SensorError> {
        *self.handle.discards.lock().unwrap() += 1;
        Ok(())
    }
}
