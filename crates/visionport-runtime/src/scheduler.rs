use anyhow::{anyhow, bail, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;
use visionport_core::Tensor;

use crate::{PredictRequest, PredictResponse, Predictor, Worker};

#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<PredictRequest>,
}

impl SchedulerHandle {
    pub async fn submit(&self, req: PredictRequest) -> Result<()> {
        self.tx
            .send(req)
            .await
            .map_err(|_| anyhow!("scheduler is no longer running"))
    }

    /// Submits `inputs` and waits for the worker's answer.
    pub async fn predict(&self, inputs: Vec<Tensor>) -> Result<PredictResponse> {
        let (req, resp_rx) = PredictRequest::new(inputs);
        self.submit(req).await?;
        resp_rx
            .await
            .map_err(|_| anyhow!("worker dropped the request"))
    }

    /// Splits `samples` into requests of at most `batch_size` samples and
    /// keeps all of them in flight. Responses are returned in request order.
    pub async fn predict_batched(
        &self,
        samples: Vec<Tensor>,
        batch_size: usize,
    ) -> Result<Vec<PredictResponse>> {
        let batch_size = batch_size.max(1);
        let mut samples = samples.into_iter().peekable();
        let mut pending = Vec::new();
        while samples.peek().is_some() {
            let chunk: Vec<Tensor> = samples.by_ref().take(batch_size).collect();
            let (req, resp_rx) = PredictRequest::new(chunk);
            self.submit(req).await?;
            pending.push(resp_rx);
        }

        let mut responses = Vec::with_capacity(pending.len());
        for resp_rx in pending {
            let resp = resp_rx
                .await
                .map_err(|_| anyhow!("worker dropped the request"))?;
            responses.push(resp);
        }
        Ok(responses)
    }
}

/// Round-robin dispatch of requests over worker inboxes.
pub struct Scheduler {
    rx: mpsc::Receiver<PredictRequest>,
    worker_txs: Vec<mpsc::Sender<PredictRequest>>,
    rr: usize,
}

impl Scheduler {
    pub fn new(
        rx: mpsc::Receiver<PredictRequest>,
        worker_txs: Vec<mpsc::Sender<PredictRequest>>,
    ) -> Self {
        Self {
            rx,
            worker_txs,
            rr: 0,
        }
    }

    pub fn handle(tx: mpsc::Sender<PredictRequest>) -> SchedulerHandle {
        SchedulerHandle { tx }
    }

    pub async fn run(mut self) -> Result<()> {
        if self.worker_txs.is_empty() {
            bail!("scheduler started without workers");
        }
        while let Some(req) = self.rx.recv().await {
            let idx = self.rr % self.worker_txs.len();
            self.rr += 1;
            self.worker_txs[idx]
                .send(req)
                .await
                .map_err(|_| anyhow!("worker {idx} stopped"))?;
        }
        Ok(())
    }

    /// Spawns one worker per loaded predictor plus the dispatching scheduler.
    ///
    /// Dropping every clone of the returned handle drains and stops the pool.
    pub fn spawn(
        predictors: Vec<Predictor>,
        queue_depth: usize,
    ) -> (SchedulerHandle, Vec<JoinHandle<()>>) {
        let queue_depth = queue_depth.max(1);
        let (sched_tx, sched_rx) = mpsc::channel(queue_depth);

        let mut worker_txs = Vec::with_capacity(predictors.len());
        let mut tasks = Vec::with_capacity(predictors.len() + 1);
        for (id, predictor) in predictors.into_iter().enumerate() {
            let (w_tx, w_rx) = mpsc::channel(queue_depth);
            worker_txs.push(w_tx);
            let worker = Worker {
                id: id as u32,
                inbox: w_rx,
                predictor,
            };
            tasks.push(tokio::spawn(worker.run()));
        }

        let scheduler = Scheduler::new(sched_rx, worker_txs);
        tasks.push(tokio::spawn(async move {
            if let Err(e) = scheduler.run().await {
                error!(error = ?e, "scheduler exited");
            }
        }));

        (Scheduler::handle(sched_tx), tasks)
    }
}
