use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use tokio::sync::oneshot;

use crate::{
    error::EngineError,
    model::{InferenceModel, RequestMetadata},
};

type Metadata<M> = <<M as InferenceModel>::Request as RequestMetadata>::Metadata;
type Reply<M> = Result<
    EngineResponse<Metadata<M>, <M as InferenceModel>::Response>,
    EngineError<<M as InferenceModel>::Error>,
>;

/// Represents the current state of the inference engine.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineState {
    /// The engine is idle and ready to accept new inference requests.
    Idle,
    /// The engine is currently processing an inference request.
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

/// Internal request wrapper carrying the channel the reply goes back on.
struct EngineRequest<M: InferenceModel>
where
    M::Request: RequestMetadata,
{
    id: u64,
    request: M::Request,
    reply: oneshot::Sender<Reply<M>>,
}

/// Response returned by the engine containing both the model's response and telemetry data.
#[derive(Debug)]
pub struct EngineResponse<Meta, Res> {
    /// Identifier assigned when the request was scheduled.
    pub id: u64,
    /// Timestamp when the inference started.
    pub start_time: Instant,
    /// Total time taken for the inference.
    pub duration: Duration,
    /// Lightweight metadata extracted from the original request.
    pub request_metadata: Meta,
    /// The actual response from the model.
    pub response: Res,
}

/// Runs a model on a dedicated thread and serializes every request through it.
///
/// The model is created once and owned by the worker for the engine's lifetime,
/// so it never needs to be `Sync`. Callers wait for their own reply.
pub struct InferenceEngine<M: InferenceModel + Send + 'static>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    state: Arc<Mutex<EngineState>>,
    req_tx: Option<mpsc::Sender<EngineRequest<M>>>,
    inference_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
}

impl<M: InferenceModel + Send + 'static> InferenceEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    /// Creates a new inference engine, moving `model` onto a background thread.
    pub fn new(mut model: M) -> Self {
        let (req_tx, req_rx) = mpsc::channel::<EngineRequest<M>>();
        let state = Arc::new(Mutex::new(EngineState::Idle));

        let inference_handle = std::thread::spawn({
            let state = state.clone();
            move || {
                while let Ok(req) = req_rx.recv() {
                    log::debug!("Running inference #{}", req.id);

                    // Extract lightweight metadata before consuming the request
                    let request_metadata = req.request.metadata();

                    set_state(&state, EngineState::Processing);
                    let start_time = Instant::now();

                    // the worker outlives a panicking model
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| model.run(req.request)));

                    let reply = match outcome {
                        Ok(Ok(response)) => {
                            let duration = start_time.elapsed();
                            log::debug!("Inference #{} completed in {:?}", req.id, duration);
                            Ok(EngineResponse {
                                id: req.id,
                                start_time,
                                duration,
                                request_metadata,
                                response,
                            })
                        }
                        Ok(Err(e)) => {
                            log::error!("Inference #{} failed: {e}", req.id);
                            Err(EngineError::Model(e))
                        }
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            log::error!("Inference #{} panicked: {message}", req.id);
                            Err(EngineError::Panicked(message))
                        }
                    };

                    set_state(&state, EngineState::Idle);

                    if req.reply.send(reply).is_err() {
                        log::warn!("Caller of inference #{} went away", req.id);
                    }
                }
                log::debug!("Inference engine stopped");
            }
        });

        Self {
            state,
            req_tx: Some(req_tx),
            inference_handle: Some(inference_handle),
            id_counter: AtomicU64::new(0),
        }
    }

    /// Returns the current state of the inference engine.
    pub fn state(&self) -> EngineState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of requests scheduled since the engine started.
    pub fn requests(&self) -> u64 {
        self.id_counter.load(Ordering::Relaxed)
    }

    /// Runs `request` on the worker and waits for the result.
    pub async fn infer(
        &self,
        request: M::Request,
    ) -> Result<EngineResponse<Metadata<M>, M::Response>, EngineError<M::Error>> {
        let reply_rx = self.schedule(request)?;
        reply_rx
            .await
            .unwrap_or_else(|_| Err(EngineError::Stopped))
    }

    /// Blocking flavour of [`Self::infer`] for callers outside an async runtime.
    pub fn infer_blocking(
        &self,
        request: M::Request,
    ) -> Result<EngineResponse<Metadata<M>, M::Response>, EngineError<M::Error>> {
        let reply_rx = self.schedule(request)?;
        reply_rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(EngineError::Stopped))
    }

    fn schedule(
        &self,
        request: M::Request,
    ) -> Result<oneshot::Receiver<Reply<M>>, EngineError<M::Error>> {
        let tx = self.req_tx.as_ref().ok_or(EngineError::Stopped)?;
        let id = self.id_counter.fetch_add(1, Ordering::Relaxed);
        let (reply, reply_rx) = oneshot::channel();

        log::debug!("Scheduling inference #{id}");
        tx.send(EngineRequest { id, request, reply })
            .map_err(|_| EngineError::Stopped)?;
        Ok(reply_rx)
    }

    /// Stops the inference engine and shuts down the background thread.
    ///
    /// Requests already queued are still processed before the thread exits.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.inference_handle.take() {
            if let Err(payload) = handle.join() {
                log::error!(
                    "Inference thread panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

impl<M: InferenceModel + Send + 'static> Drop for InferenceEngine<M>
where
    M::Request: Send + RequestMetadata + 'static,
    M::Response: Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn set_state(state: &Mutex<EngineState>, value: EngineState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}
