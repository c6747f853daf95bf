use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::{PredictRequest, PredictResponse, Predictor, Timings};

/// Owns one loaded predictor and serves requests from its inbox in order.
pub struct Worker {
    pub id: u32,
    pub inbox: mpsc::Receiver<PredictRequest>,
    pub predictor: Predictor,
}

impl Worker {
    pub async fn run(mut self) {
        info!(worker_id = self.id, modality = %self.predictor.modality(), "worker started");
        while let Some(req) = self.inbox.recv().await {
            let queued_us = req.enqueued_at.elapsed().as_micros() as u64;

            let t0 = Instant::now();
            let predicted = self.predictor.predict(&req.inputs);
            let backend_us = t0.elapsed().as_micros() as u64;

            let t1 = Instant::now();
            let result = predicted.and_then(|()| self.predictor.read_predicted_features());
            let decode_us = t1.elapsed().as_micros() as u64;

            let resp = PredictResponse {
                worker_id: self.id,
                result,
                timings: Timings {
                    queued_us,
                    backend_us,
                    decode_us,
                },
            };
            if req.resp_tx.send(resp).is_err() {
                debug!(worker_id = self.id, "requester went away");
            }
        }
        self.predictor.close();
        info!(worker_id = self.id, "worker stopped");
    }
}
