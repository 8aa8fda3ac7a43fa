//! Remote keypoint-detection service adapter.
//!
//! The canvas is JPEG-encoded and posted as multipart field `file`; the JSON
//! reply is decoded by [`super::keypoints`].

use std::future::Future;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::error::{SessionError, SourceError};
use crate::frame::Frame;
use crate::landmarks::{LandmarkOrigin, LandmarkSet};

use super::keypoints::parse_keypoint_response;
use super::{with_timeout, BackendError, LandmarkSource, RequestGate};

const SOURCE_NAME: &str = "Cloud model";

/// Remote service settings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Full URL, or a bare `project/version` path appended to `default_host`.
    pub endpoint: String,
    pub api_key: Option<String>,
    pub default_host: String,
    pub timeout_ms: Option<u64>,
    pub jpeg_quality: u8,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: None,
            default_host: "https://detect.roboflow.com/".to_string(),
            timeout_ms: Some(30_000),
            jpeg_quality: 92,
        }
    }
}

/// Build the request URL from a user-supplied endpoint and optional key.
///
/// Endpoints without an `http(s)://` scheme get `default_host` prepended
/// (leading slashes dropped). The key is appended as an `api_key` query
/// parameter unless the URL already carries one.
pub fn resolve_endpoint_url(
    endpoint: &str,
    api_key: Option<&str>,
    default_host: &str,
) -> Result<String, SessionError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(SessionError::NoEndpoint);
    }
    let lower = endpoint.to_ascii_lowercase();
    let raw = if lower.starts_with("http://") || lower.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!(
            "{}/{}",
            default_host.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    };
    let mut url = reqwest::Url::parse(&raw).map_err(|_| SessionError::InvalidEndpoint)?;
    if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
        if !raw.contains("api_key=") {
            url.query_pairs_mut().append_pair("api_key", key);
        }
    }
    Ok(url.into())
}

/// Status and body of one service reply.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Posts one encoded image to the service.
pub trait KeypointTransport: Send + Sync {
    fn post_image<'a>(
        &'a self,
        url: &'a str,
        jpeg: Vec<u8>,
    ) -> impl Future<Output = Result<TransportResponse, BackendError>> + Send + 'a;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl KeypointTransport for HttpTransport {
    fn post_image<'a>(
        &'a self,
        url: &'a str,
        jpeg: Vec<u8>,
    ) -> impl Future<Output = Result<TransportResponse, BackendError>> + Send + 'a {
        async move {
            let part = reqwest::multipart::Part::bytes(jpeg)
                .file_name("hand.jpg")
                .mime_str("image/jpeg")?;
            let form = reqwest::multipart::Form::new().part("file", part);
            let response = self.client.post(url).multipart(form).send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?.to_vec();
            Ok::<_, BackendError>(TransportResponse { status, body })
        }
    }
}

/// Encode the canvas as a baseline RGB JPEG.
pub(crate) fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, SourceError> {
    let rgb = DynamicImage::ImageRgba8(frame.rgba().clone()).to_rgb8();
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(SourceError::Encode)?;
    Ok(buf.into_inner())
}

/// Landmark source backed by a remote keypoint service.
#[derive(Debug)]
pub struct RemoteSource<T> {
    url: String,
    config: RemoteConfig,
    transport: T,
    gate: RequestGate,
}

impl<T: KeypointTransport> RemoteSource<T> {
    /// Fails with `NoEndpoint`/`InvalidEndpoint` before any request is made.
    pub fn new(config: RemoteConfig, transport: T) -> Result<Self, SessionError> {
        let url = resolve_endpoint_url(
            &config.endpoint,
            config.api_key.as_deref(),
            &config.default_host,
        )?;
        Ok(Self {
            url,
            config,
            transport,
            gate: RequestGate::new(SOURCE_NAME),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn run(&self, frame: &Frame) -> Result<LandmarkSet, SourceError> {
        let _permit = self.gate.try_acquire()?;
        let jpeg = encode_jpeg(frame, self.config.jpeg_quality)?;
        tracing::info!("sending {} byte image to cloud model", jpeg.len());

        let response = with_timeout(SOURCE_NAME, self.config.timeout_ms, async {
            self.transport
                .post_image(&self.url, jpeg)
                .await
                .map_err(SourceError::Transport)
        })
        .await?;
        if !(200..300).contains(&response.status) {
            tracing::warn!("cloud model answered {}", response.status);
            return Err(SourceError::Status {
                status: response.status,
            });
        }
        let payload: serde_json::Value =
            serde_json::from_slice(&response.body).map_err(SourceError::MalformedResponse)?;
        parse_keypoint_response(&payload)?.into_landmarks()
    }
}

impl<T: KeypointTransport> LandmarkSource for RemoteSource<T> {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn origin(&self) -> LandmarkOrigin {
        LandmarkOrigin::Cloud
    }

    fn acquire<'a>(
        &'a self,
        frame: &'a Frame,
    ) -> impl Future<Output = Result<LandmarkSet, SourceError>> + Send + 'a {
        self.run(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::frame_with_crease_step;
    use std::sync::Mutex;
    use std::time::Duration;

    const HOST: &str = "https://detect.roboflow.com/";

    struct Canned {
        status: u16,
        body: String,
        delay: Option<Duration>,
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl Canned {
        fn ok(body: &str) -> Self {
            Self {
                status: 200,
                body: body.to_string(),
                delay: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl KeypointTransport for Canned {
        async fn post_image<'a>(
            &'a self,
            url: &'a str,
            jpeg: Vec<u8>,
        ) -> Result<TransportResponse, BackendError> {
            self.seen.lock().unwrap().push((url.to_string(), jpeg.len()));
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            Ok(TransportResponse {
                status: self.status,
                body: self.body.clone().into_bytes(),
            })
        }
    }

    fn config(endpoint: &str) -> RemoteConfig {
        RemoteConfig {
            endpoint: endpoint.to_string(),
            api_key: Some("k3y".to_string()),
            ..Default::default()
        }
    }

    const GOOD_BODY: &str = r#"{"predictions":[{"confidence":0.9,"keypoints":[
        {"class":"index_base","x":10,"y":40,"confidence":0.9},
        {"class":"index_tip","x":10,"y":5,"confidence":0.9},
        {"class":"ring_base","x":30,"y":40,"confidence":0.7},
        {"class":"ring_tip","x":30,"y":2,"confidence":0.7}]}]}"#;

    #[test]
    fn bare_endpoint_gets_default_host_and_key() {
        let url = resolve_endpoint_url("//my-hands/3", Some(" k3y "), HOST).unwrap();
        assert_eq!(url, "https://detect.roboflow.com/my-hands/3?api_key=k3y");

        let url = resolve_endpoint_url("https://x.test/m?format=json", Some("a b"), HOST).unwrap();
        assert_eq!(url, "https://x.test/m?format=json&api_key=a+b");

        let url = resolve_endpoint_url("HTTP://x.test/m?api_key=old", Some("new"), HOST).unwrap();
        assert!(url.ends_with("api_key=old"));
    }

    #[test]
    fn endpoint_preconditions() {
        assert_eq!(resolve_endpoint_url("  ", None, HOST), Err(SessionError::NoEndpoint));
        assert_eq!(
            resolve_endpoint_url("https://", None, HOST),
            Err(SessionError::InvalidEndpoint)
        );
        assert!(matches!(
            RemoteSource::new(RemoteConfig::default(), Canned::ok("{}")),
            Err(SessionError::NoEndpoint)
        ));
    }

    #[tokio::test]
    async fn posts_jpeg_and_parses_keypoints() {
        let frame = frame_with_crease_step(64, 48, 20.0);
        let source = RemoteSource::new(config("hands/1"), Canned::ok(GOOD_BODY)).unwrap();
        let set = source.acquire(&frame).await.unwrap();
        assert_eq!(set.source, LandmarkOrigin::Cloud);
        assert!((set.confidence - 0.8).abs() < 1e-12);

        let seen = source.transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "https://detect.roboflow.com/hands/1?api_key=k3y");
        assert!(seen[0].1 > 0);
    }

    #[tokio::test]
    async fn http_and_body_failures() {
        let frame = frame_with_crease_step(16, 16, 8.0);
        let mut failing = Canned::ok("");
        failing.status = 503;
        let source = RemoteSource::new(config("m/1"), failing).unwrap();
        let err = source.acquire(&frame).await.unwrap_err();
        assert_eq!(err.to_string(), "Cloud request failed (503).");

        let source = RemoteSource::new(config("m/1"), Canned::ok("<html>")).unwrap();
        assert!(matches!(
            source.acquire(&frame).await,
            Err(SourceError::MalformedResponse(_))
        ));

        let body = GOOD_BODY.replace("ring_tip", "pinky_tip");
        let source = RemoteSource::new(config("m/1"), Canned::ok(&body)).unwrap();
        assert_eq!(
            source.acquire(&frame).await.unwrap_err().to_string(),
            "Cloud response missing required keypoints."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_request_is_busy() {
        let frame = frame_with_crease_step(16, 16, 8.0);
        let mut slow = Canned::ok(GOOD_BODY);
        slow.delay = Some(Duration::from_secs(5));
        let source = RemoteSource::new(config("m/1"), slow).unwrap();

        let (first, second) = tokio::join!(source.acquire(&frame), async {
            tokio::task::yield_now().await;
            source.acquire(&frame).await
        });
        assert!(first.is_ok());
        assert!(matches!(second, Err(SourceError::Busy("Cloud model"))));
        assert_eq!(source.transport.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_service_times_out() {
        let frame = frame_with_crease_step(16, 16, 8.0);
        let mut slow = Canned::ok(GOOD_BODY);
        slow.delay = Some(Duration::from_secs(60));
        let mut cfg = config("m/1");
        cfg.timeout_ms = Some(1_000);
        let source = RemoteSource::new(cfg, slow).unwrap();
        assert!(matches!(
            source.acquire(&frame).await,
            Err(SourceError::Timeout("Cloud model", 1_000))
        ));
        // The gate is released after the timeout.
        assert!(!source.gate.is_busy());
    }
}
