use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use rayon::prelude::*;

use crate::foundation::core::FrameRgba;
use crate::foundation::error::{CountickError, CountickResult};
use crate::render::renderer::FrameRenderer;

/// Request message into the render worker.
#[derive(Clone, Debug)]
pub enum WorkerRequest {
    /// Render the frames for the listed remaining-seconds values.
    Generate {
        /// Values to render, in the order results should be returned.
        seconds: Vec<u32>,
        /// Correlates responses with the request that produced them.
        worker_id: u64,
    },
}

/// Response message out of the render worker.
#[derive(Clone, Debug)]
pub enum WorkerResponse {
    /// Aggregate render progress, 0–100.
    Progress {
        /// Percentage of requested frames finished.
        progress: f32,
        /// Id of the originating request.
        worker_id: u64,
    },
    /// All requested frames, paired with their remaining-seconds values, in request order.
    Complete {
        /// `(remaining_secs, frame)` pairs.
        frames: Vec<(u32, Arc<FrameRgba>)>,
        /// Id of the originating request.
        worker_id: u64,
    },
    /// Rendering failed.
    Error {
        /// Failure description.
        error: String,
        /// Id of the originating request.
        worker_id: u64,
    },
}

/// Out-of-line frame renderer: a dedicated thread with typed request/response channels.
///
/// Dropping the handle disconnects the request channel and joins the thread, so no worker
/// survives its request scope — cancellation is "terminate and discard channel", not silent
/// drop.
pub struct RenderWorker {
    requests: Option<Sender<WorkerRequest>>,
    responses: Receiver<WorkerResponse>,
    join: Option<JoinHandle<()>>,
}

impl RenderWorker {
    /// Spawn the worker thread around a shared renderer.
    pub fn spawn(renderer: Arc<dyn FrameRenderer>) -> Self {
        let (req_tx, req_rx) = unbounded::<WorkerRequest>();
        let (resp_tx, resp_rx) = unbounded::<WorkerResponse>();
        let join = std::thread::spawn(move || worker_loop(renderer, &req_rx, &resp_tx));
        Self {
            requests: Some(req_tx),
            responses: resp_rx,
            join: Some(join),
        }
    }

    /// Submit a request.
    pub fn request(&self, req: WorkerRequest) -> CountickResult<()> {
        let tx = self
            .requests
            .as_ref()
            .ok_or_else(|| CountickError::render_surface("render worker already terminated"))?;
        tx.send(req)
            .map_err(|_| CountickError::render_surface("render worker is not accepting requests"))
    }

    /// Response channel for the submitted requests.
    pub fn responses(&self) -> &Receiver<WorkerResponse> {
        &self.responses
    }

    /// Disconnect the request channel and join the thread.
    pub fn terminate(&mut self) {
        drop(self.requests.take());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn worker_loop(
    renderer: Arc<dyn FrameRenderer>,
    requests: &Receiver<WorkerRequest>,
    responses: &Sender<WorkerResponse>,
) {
    while let Ok(WorkerRequest::Generate { seconds, worker_id }) = requests.recv() {
        let total = seconds.len();
        if total == 0 {
            let _ = responses.send(WorkerResponse::Complete {
                frames: Vec::new(),
                worker_id,
            });
            continue;
        }

        let done = AtomicUsize::new(0);
        let rendered: CountickResult<Vec<(u32, Arc<FrameRgba>)>> = seconds
            .par_iter()
            .map(|&s| {
                let frame = renderer.render(s)?;
                let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
                let _ = responses.send(WorkerResponse::Progress {
                    progress: finished as f32 / total as f32 * 100.0,
                    worker_id,
                });
                Ok((s, Arc::new(frame)))
            })
            .collect();

        let message = match rendered {
            Ok(frames) => WorkerResponse::Complete { frames, worker_id },
            Err(e) => WorkerResponse::Error {
                error: e.to_string(),
                worker_id,
            },
        };
        if responses.send(message).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::renderer::BlockDigitRenderer;

    fn collect_outcome(worker: &RenderWorker) -> WorkerResponse {
        loop {
            match worker.responses().recv() {
                Ok(WorkerResponse::Progress { .. }) => continue,
                Ok(done) => return done,
                Err(e) => panic!("worker channel closed early: {e}"),
            }
        }
    }

    #[test]
    fn worker_renders_requested_seconds_in_order() {
        let worker = RenderWorker::spawn(Arc::new(BlockDigitRenderer::with_size(16, 16)));
        worker
            .request(WorkerRequest::Generate {
                seconds: vec![3, 1, 4],
                worker_id: 7,
            })
            .unwrap();

        match collect_outcome(&worker) {
            WorkerResponse::Complete { frames, worker_id } => {
                assert_eq!(worker_id, 7);
                let order: Vec<u32> = frames.iter().map(|(s, _)| *s).collect();
                assert_eq!(order, vec![3, 1, 4]);
            }
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn worker_reports_progress_up_to_100() {
        let worker = RenderWorker::spawn(Arc::new(BlockDigitRenderer::with_size(16, 16)));
        worker
            .request(WorkerRequest::Generate {
                seconds: (0..10).collect(),
                worker_id: 1,
            })
            .unwrap();

        let mut saw_full = false;
        loop {
            match worker.responses().recv().unwrap() {
                WorkerResponse::Progress { progress, .. } => {
                    assert!((0.0..=100.0).contains(&progress));
                    if (progress - 100.0).abs() < f32::EPSILON {
                        saw_full = true;
                    }
                }
                WorkerResponse::Complete { frames, .. } => {
                    assert_eq!(frames.len(), 10);
                    break;
                }
                WorkerResponse::Error { error, .. } => panic!("unexpected error: {error}"),
            }
        }
        assert!(saw_full);
    }

    struct FailingRenderer;

    impl FrameRenderer for FailingRenderer {
        fn render(&self, _remaining_secs: u32) -> CountickResult<FrameRgba> {
            Err(CountickError::render_surface("no canvas"))
        }
    }

    #[test]
    fn renderer_failure_surfaces_as_error_response() {
        let worker = RenderWorker::spawn(Arc::new(FailingRenderer));
        worker
            .request(WorkerRequest::Generate {
                seconds: vec![0, 1],
                worker_id: 2,
            })
            .unwrap();

        match collect_outcome(&worker) {
            WorkerResponse::Error { error, worker_id } => {
                assert_eq!(worker_id, 2);
                assert!(error.contains("no canvas"));
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn terminate_joins_the_thread_and_rejects_new_requests() {
        let mut worker = RenderWorker::spawn(Arc::new(BlockDigitRenderer::with_size(16, 16)));
        worker.terminate();
        assert!(
            worker
                .request(WorkerRequest::Generate {
                    seconds: vec![0],
                    worker_id: 0,
                })
                .is_err()
        );
    }
}
