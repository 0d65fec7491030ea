use std::{
    sync::{
        Arc, Mutex, MutexGuard, mpsc,
        atomic::{AtomicU64, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use tokio::sync::oneshot;

use crate::{
    error::{GeogenieError, ModelError, Result},
    model::{RequestMetadata, VisionModel, VisionRequest},
};

/// Represents the current state of the inference engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EngineState {
    /// Waiting for the next request.
    Idle,
    /// A generate call is running on the model thread.
    Processing,
}

impl EngineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Processing => "processing",
        }
    }
}

/// Completed inference with its telemetry.
#[derive(Debug)]
pub struct EngineResponse {
    /// Identifier assigned when the request was submitted.
    pub id: u64,
    /// When the model started working on the request.
    pub start_time: Instant,
    /// Time spent inside the model.
    pub duration: Duration,
    pub request_metadata: RequestMetadata,
    /// Decoded model output.
    pub text: String,
}

type Reply = oneshot::Sender<Result<EngineResponse, ModelError>>;

struct EngineRequest {
    id: u64,
    request: VisionRequest,
    reply: Reply,
}

/// Owns a [`VisionModel`] on a dedicated thread and feeds it one request at a
/// time.
///
/// The model is loaded once by the caller and moved into the engine. Requests
/// queue on a channel; async callers await their own reply so a long generate
/// call never blocks the runtime.
pub struct InferenceEngine {
    model_name: String,
    state: Arc<Mutex<EngineState>>,
    req_tx: Option<mpsc::Sender<EngineRequest>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
}

fn lock_state(state: &Mutex<EngineState>) -> MutexGuard<'_, EngineState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InferenceEngine {
    /// Spawns the model thread and hands it `model`.
    pub fn new<M: VisionModel + Send + 'static>(mut model: M) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<EngineRequest>();
        let state = Arc::new(Mutex::new(EngineState::Idle));
        let model_name = model.name().to_string();

        let inference_handle = std::thread::spawn({
            let state = state.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Running inference #{} on {}", req.id, model.name());

                    let request_metadata = req.request.metadata();

                    *lock_state(&state) = EngineState::Processing;
                    let start_time = Instant::now();

                    let result = model.run(req.request).map(|response| EngineResponse {
                        id: req.id,
                        start_time,
                        duration: start_time.elapsed(),
                        request_metadata,
                        text: response.text,
                    });

                    match &result {
                        Ok(response) => {
                            log::debug!("Inference #{} completed in {:?}", req.id, response.duration)
                        }
                        Err(e) => log::warn!("Inference #{} failed: {e}", req.id),
                    }

                    // the caller may have gone away; nothing to do then
                    let _ = req.reply.send(result);

                    *lock_state(&state) = EngineState::Idle;
                }
                log::debug!("Inference thread exiting");
            }
        });

        Self {
            model_name,
            state,
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: AtomicU64::new(0),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> EngineState {
        *lock_state(&self.state)
    }

    /// Queues `request` and returns a receiver for its result.
    pub fn submit(
        &self,
        request: VisionRequest,
    ) -> Result<oneshot::Receiver<Result<EngineResponse, ModelError>>> {
        let tx = self.req_tx.as_ref().ok_or(GeogenieError::EngineClosed)?;
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (reply, rx) = oneshot::channel();
        tx.send(EngineRequest { id, request, reply })
            .map_err(|_| GeogenieError::EngineClosed)?;
        Ok(rx)
    }

    /// Queues `request` and waits for the model to answer it.
    pub async fn infer(&self, request: VisionRequest) -> Result<EngineResponse> {
        let rx = self.submit(request)?;
        let response = rx.await.map_err(|_| GeogenieError::EngineClosed)??;
        Ok(response)
    }

    /// Closes the request channel and waits for queued requests to drain.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            if handle.join().is_err() {
                log::error!("Inference thread panicked");
            }
        }
    }
}

impl Drop for InferenceEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
