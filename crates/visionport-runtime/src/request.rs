use std::time::Instant;

use tokio::sync::oneshot;
use visionport_core::{PredictorError, Tensor};

use crate::Features;

/// One predict call routed to a worker. `inputs` holds one tensor per sample.
#[derive(Debug)]
pub struct PredictRequest {
    pub inputs: Vec<Tensor>,
    pub enqueued_at: Instant,
    pub resp_tx: oneshot::Sender<PredictResponse>,
}

impl PredictRequest {
    pub fn new(inputs: Vec<Tensor>) -> (Self, oneshot::Receiver<PredictResponse>) {
        let (resp_tx, resp_rx) = oneshot::channel();
        let req = Self {
            inputs,
            enqueued_at: Instant::now(),
            resp_tx,
        };
        (req, resp_rx)
    }
}

#[derive(Debug)]
pub struct PredictResponse {
    pub worker_id: u32,
    pub result: Result<Features, PredictorError>,
    pub timings: Timings,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Timings {
    pub queued_us: u64,
    pub backend_us: u64,
    pub decode_us: u64,
}
