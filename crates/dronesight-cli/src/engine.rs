use dronesight_core::{Analysis, FacePipeline};
use dronesight_hw::{BindOutcome, Frame, FrameError, Previewer, VideoLink};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("video link not ready: {0:?}")]
    NotBound(BindOutcome),
    #[error("no frame received within {}s", .0.as_secs_f32())]
    NoFrame(Duration),
    #[error("frame encoding failed: {0}")]
    Encode(#[from] FrameError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of one capture-and-analyse request.
#[derive(Debug)]
pub struct AnalysisReport {
    pub analysis: Analysis,
    /// Sequence number of the captured frame.
    pub frame_sequence: u32,
    pub frame_size: (u32, u32),
    pub jpeg_bytes: usize,
    pub elapsed: Duration,
}

/// Capture settings handed to the engine thread.
#[derive(Debug, Clone, Copy)]
pub struct CaptureSettings {
    pub frame_timeout: Duration,
    pub jpeg_quality: u8,
}

/// Messages sent from the front end to the engine thread.
enum EngineRequest {
    Analyze {
        reply: oneshot::Sender<Result<AnalysisReport, EngineError>>,
    },
    Rebind {
        reply: oneshot::Sender<BindOutcome>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Capture the current frame and run it through the face pipeline.
    pub async fn analyze(&self) -> Result<AnalysisReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Analyze { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Re-run preview binding, e.g. after the product reconnects.
    pub async fn rebind(&self) -> Result<BindOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Rebind { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Binds the preview to the link's primary feed, then serves requests one at
/// a time until every [`EngineHandle`] is dropped. The preview is unbound
/// when the thread exits.
pub fn spawn_engine(
    link: Arc<dyn VideoLink>,
    pipeline: FacePipeline,
    settings: CaptureSettings,
    runtime: Handle,
) -> (EngineHandle, BindOutcome) {
    let mut previewer = Previewer::new(link);
    let outcome = previewer.bind();
    tracing::info!(?outcome, "preview binding");

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("dronesight-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut bind_state = outcome;
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze { reply } => {
                        let result = if bind_state == BindOutcome::Bound {
                            run_analyze(&previewer, &pipeline, settings, &runtime)
                        } else {
                            Err(EngineError::NotBound(bind_state))
                        };
                        let _ = reply.send(result);
                    }
                    EngineRequest::Rebind { reply } => {
                        bind_state = previewer.bind();
                        tracing::info!(outcome = ?bind_state, "preview rebind");
                        let _ = reply.send(bind_state);
                    }
                }
            }
            previewer.unbind();
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    (EngineHandle { tx }, outcome)
}

/// Grab the latest frame, encode it and block on the pipeline.
fn run_analyze(
    previewer: &Previewer,
    pipeline: &FacePipeline,
    settings: CaptureSettings,
    runtime: &Handle,
) -> Result<AnalysisReport, EngineError> {
    let started = Instant::now();
    let frame: Frame = previewer
        .wait_for_frame(settings.frame_timeout)
        .ok_or(EngineError::NoFrame(settings.frame_timeout))?;
    let jpeg = frame.to_jpeg(settings.jpeg_quality)?;

    tracing::debug!(
        seq = frame.sequence,
        width = frame.width,
        height = frame.height,
        jpeg_bytes = jpeg.len(),
        "frame captured"
    );

    let jpeg_bytes = jpeg.len();
    let analysis = runtime.block_on(pipeline.run(jpeg));

    Ok(AnalysisReport {
        analysis,
        frame_sequence: frame.sequence,
        frame_size: (frame.width, frame.height),
        jpeg_bytes,
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dronesight_core::{
        DetectedFace, FaceApiError, FaceId, FaceService, IdentifyOptions, IdentifyResult, Person,
        PersonId,
    };
    use dronesight_hw::{FrameCallback, ProductInfo, ProductModel, VideoFeed};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct NoFaces {
        detect_calls: AtomicUsize,
        last_jpeg: Mutex<Vec<u8>>,
    }

    #[async_trait]
    impl FaceService for NoFaces {
        async fn detect(&self, jpeg: Vec<u8>) -> Result<Vec<DetectedFace>, FaceApiError> {
            self.detect_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_jpeg.lock().unwrap() = jpeg;
            Ok(Vec::new())
        }

        async fn identify(
            &self,
            _face_ids: &[FaceId],
            _options: &IdentifyOptions,
        ) -> Result<Vec<IdentifyResult>, FaceApiError> {
            unreachable!("identify must not run without faces")
        }

        async fn person(&self, _group: &str, _id: PersonId) -> Result<Person, FaceApiError> {
            unreachable!("lookup must not run without faces")
        }
    }

    #[derive(Default)]
    struct ManualFeed {
        callback: Mutex<Option<FrameCallback>>,
    }

    impl ManualFeed {
        fn push(&self, sequence: u32) {
            let cb = self.callback.lock().unwrap().clone();
            if let Some(cb) = cb {
                cb(Frame::from_rgb(vec![128; 8 * 8 * 3], 8, 8, sequence).unwrap());
            }
        }
    }

    impl VideoFeed for ManualFeed {
        fn set_callback(&self, callback: Option<FrameCallback>) {
            *self.callback.lock().unwrap() = callback;
        }
    }

    struct ManualLink {
        connected: bool,
        feed: Arc<ManualFeed>,
    }

    impl VideoLink for ManualLink {
        fn product(&self) -> Option<ProductInfo> {
            self.connected.then(|| ProductInfo {
                model: ProductModel::Known("test rig".into()),
                connected: true,
            })
        }

        fn video_feeds(&self) -> Vec<Arc<dyn VideoFeed>> {
            vec![self.feed.clone() as Arc<dyn VideoFeed>]
        }
    }

    fn settings() -> CaptureSettings {
        CaptureSettings {
            frame_timeout: Duration::from_millis(200),
            jpeg_quality: 90,
        }
    }

    fn service() -> Arc<NoFaces> {
        Arc::new(NoFaces {
            detect_calls: AtomicUsize::new(0),
            last_jpeg: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_analyze_captures_latest_frame() {
        let feed = Arc::new(ManualFeed::default());
        let link = Arc::new(ManualLink { connected: true, feed: feed.clone() });
        let svc = service();
        let pipeline = FacePipeline::new(svc.clone(), IdentifyOptions::new("crew"));

        let (engine, outcome) = spawn_engine(link, pipeline, settings(), Handle::current());
        assert_eq!(outcome, BindOutcome::Bound);

        feed.push(3);
        feed.push(4);
        let report = engine.analyze().await.unwrap();

        assert_eq!(report.frame_sequence, 4);
        assert_eq!(report.frame_size, (8, 8));
        assert!(matches!(report.analysis, Analysis::NoFaceDetected { cause: None }));
        assert_eq!(svc.detect_calls.load(Ordering::SeqCst), 1);
        assert_eq!(&svc.last_jpeg.lock().unwrap()[..2], &[0xFF, 0xD8]);
        assert_eq!(report.jpeg_bytes, svc.last_jpeg.lock().unwrap().len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_analyze_without_frame_times_out() {
        let feed = Arc::new(ManualFeed::default());
        let link = Arc::new(ManualLink { connected: true, feed });
        let svc = service();
        let pipeline = FacePipeline::new(svc.clone(), IdentifyOptions::new("crew"));

        let (engine, _) = spawn_engine(link, pipeline, settings(), Handle::current());
        let err = engine.analyze().await.unwrap_err();
        assert!(matches!(err, EngineError::NoFrame(_)));
        assert_eq!(svc.detect_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_analyze_when_disconnected() {
        let feed = Arc::new(ManualFeed::default());
        let link = Arc::new(ManualLink { connected: false, feed });
        let pipeline = FacePipeline::new(service(), IdentifyOptions::new("crew"));

        let (engine, outcome) = spawn_engine(link, pipeline, settings(), Handle::current());
        assert_eq!(outcome, BindOutcome::Disconnected);
        assert!(matches!(
            engine.analyze().await.unwrap_err(),
            EngineError::NotBound(_)
        ));
        assert_eq!(engine.rebind().await.unwrap(), BindOutcome::Disconnected);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_handle_unbinds_feed() {
        let feed = Arc::new(ManualFeed::default());
        let link = Arc::new(ManualLink { connected: true, feed: feed.clone() });
        let pipeline = FacePipeline::new(service(), IdentifyOptions::new("crew"));

        let (engine, _) = spawn_engine(link, pipeline, settings(), Handle::current());
        assert!(feed.callback.lock().unwrap().is_some());
        drop(engine);

        let deadline = Instant::now() + Duration::from_secs(2);
        while feed.callback.lock().unwrap().is_some() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(feed.callback.lock().unwrap().is_none());
    }
}
