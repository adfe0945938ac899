use std::process::Stdio;

use reqwest::StatusCode;
use serde_json::Value;
use tokio::process::Command;

use crate::config::{seconds, ProbeConfig};
use crate::error::ProbeError;
use crate::probe::types::{FormatInfo, MediaMetadata, ProbeOutput, ProbeResult, StreamInfo, StreamType};

/// Inspects remote media with ffprobe
///
/// Probing is read-only and idempotent. Every call is bounded by `timeout_sec`,
/// reachability check included.
#[derive(Clone)]
pub struct MetadataProber {
    config: ProbeConfig,
    client: reqwest::Client,
}

impl MetadataProber {
    pub fn new(config: ProbeConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Probe the asset at `url`
    pub async fn probe(&self, url: &str) -> ProbeResult<ProbeOutput> {
        let limit = seconds(self.config.timeout_sec);

        match tokio::time::timeout(limit, self.probe_unbounded(url)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Probe of {} exceeded {:.1}s", url, limit.as_secs_f64());
                Err(ProbeError::Timeout { url: url.to_string() })
            }
        }
    }

    async fn probe_unbounded(&self, url: &str) -> ProbeResult<ProbeOutput> {
        let parsed = url::Url::parse(url).map_err(|e| ProbeError::Unknown {
            url: url.to_string(),
            reason: format!("invalid URL: {}", e),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ProbeError::Unknown {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        if self.config.reachability_check {
            self.check_reachable(parsed).await?;
        }

        tracing::debug!("Probing {} with {}", url, self.config.ffprobe_path);

        let output = Command::new(&self.config.ffprobe_path)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Unknown {
                url: url.to_string(),
                reason: format!("failed to run {}: {}", self.config.ffprobe_path, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_stderr(url, &stderr));
        }

        let raw: Value = serde_json::from_slice(&output.stdout).map_err(|e| ProbeError::Unknown {
            url: url.to_string(),
            reason: format!("unreadable ffprobe output: {}", e),
        })?;

        let metadata = normalize(&raw);
        tracing::debug!(
            "Probed {}: {} streams, duration {:?}",
            url, metadata.streams.len(), metadata.format.duration
        );

        Ok(ProbeOutput { metadata, raw })
    }

    /// HEAD the asset; 405/501 mean the server does not do HEAD and are let through
    async fn check_reachable(&self, url: url::Url) -> ProbeResult<()> {
        let display = url.to_string();
        let response = self.client.head(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ProbeError::Timeout { url: display.clone() }
            } else if e.is_connect() {
                ProbeError::NotFound { url: display.clone() }
            } else {
                ProbeError::Unknown { url: display.clone(), reason: e.to_string() }
            }
        })?;

        match response.status() {
            status if status.is_success() || status.is_redirection() => Ok(()),
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(ProbeError::NotFound { url: display }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProbeError::Forbidden { url: display }),
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => Ok(()),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Err(ProbeError::Timeout { url: display }),
            status => Err(ProbeError::Unknown {
                url: display,
                reason: format!("HTTP {}", status),
            }),
        }
    }
}

/// Map ffprobe's error text onto a failure kind
pub fn classify_stderr(url: &str, stderr: &str) -> ProbeError {
    let lower = stderr.to_lowercase();
    let url = url.to_string();

    if lower.contains("404") || lower.contains("410") || lower.contains("no such file")
        || lower.contains("connection refused") || lower.contains("could not resolve")
    {
        ProbeError::NotFound { url }
    } else if lower.contains("403") || lower.contains("401") || lower.contains("forbidden") {
        ProbeError::Forbidden { url }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ProbeError::Timeout { url }
    } else {
        ProbeError::Unknown {
            url,
            reason: stderr.trim().lines().last().unwrap_or("ffprobe failed").to_string(),
        }
    }
}

/// Normalize raw ffprobe JSON. ffprobe reports most numbers as strings and frame
/// rates as `num/den`.
pub fn normalize(raw: &Value) -> MediaMetadata {
    let format = raw
        .get("format")
        .map(|f| FormatInfo {
            duration: number(f.get("duration")),
            size: number(f.get("size")).map(|v| v as u64),
            bit_rate: number(f.get("bit_rate")).map(|v| v as u64),
        })
        .unwrap_or_default();

    let streams = raw
        .get("streams")
        .and_then(|s| s.as_array())
        .map(|streams| streams.iter().map(parse_stream).collect())
        .unwrap_or_default();

    MediaMetadata { format, streams }
}

fn parse_stream(stream: &Value) -> StreamInfo {
    let stream_type = stream
        .get("codec_type")
        .and_then(|t| t.as_str())
        .map(StreamType::from_codec_type)
        .unwrap_or(StreamType::Other);

    let frame_rate = match stream_type {
        StreamType::Video => rate(stream.get("avg_frame_rate")).or_else(|| rate(stream.get("r_frame_rate"))),
        _ => None,
    };

    StreamInfo {
        stream_type,
        codec: stream.get("codec_name").and_then(|c| c.as_str()).map(str::to_string),
        width: number(stream.get("width")).map(|v| v as u32),
        height: number(stream.get("height")).map(|v| v as u32),
        frame_rate,
        sample_rate: number(stream.get("sample_rate")).map(|v| v as u32),
        channels: number(stream.get("channels")).map(|v| v as u32),
    }
}

/// Number from either a JSON number or a numeric string
fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (parsed.is_finite() && parsed >= 0.0).then_some(parsed)
}

/// Frame rate from `num/den`; `0/0` means unknown
fn rate(value: Option<&Value>) -> Option<f64> {
    let text = value?.as_str()?;
    let (num, den) = text.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den > 0.0 && num > 0.0).then(|| num / den)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use axum::{http::StatusCode as AxumStatus, Router};
    use serde_json::json;

    fn prober(timeout_sec: f64) -> MetadataProber {
        let config = ProbeConfig {
            timeout_sec,
            ..Default::default()
        };
        MetadataProber::new(config, reqwest::Client::new())
    }

    async fn serve(app: Router) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_normalize_ffprobe_output() {
        let raw = json!({
            "streams": [
                {
                    "index": 0,
                    "codec_name": "h264",
                    "codec_type": "video",
                    "width": 1080,
                    "height": 1920,
                    "r_frame_rate": "30/1",
                    "avg_frame_rate": "30000/1001"
                },
                {
                    "index": 1,
                    "codec_name": "aac",
                    "codec_type": "audio",
                    "sample_rate": "48000",
                    "channels": 2,
                    "avg_frame_rate": "0/0"
                }
            ],
            "format": {
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "12.345000",
                "size": "1048576",
                "bit_rate": "679493"
            }
        });

        let metadata = normalize(&raw);

        assert_eq!(metadata.duration(), Some(12.345));
        assert_eq!(metadata.format.size, Some(1_048_576));
        assert_eq!(metadata.format.bit_rate, Some(679_493));
        assert_eq!(metadata.dimensions(), Some((1080, 1920)));
        assert!(metadata.has_audio());

        let video = metadata.video_stream().unwrap();
        assert_eq!(video.codec.as_deref(), Some("h264"));
        assert!((video.frame_rate.unwrap() - 29.97).abs() < 0.01);

        let audio = &metadata.streams[1];
        assert_eq!(audio.stream_type, StreamType::Audio);
        assert_eq!(audio.sample_rate, Some(48000));
        assert_eq!(audio.channels, Some(2));
        assert_eq!(audio.frame_rate, None);
    }

    #[test]
    fn test_normalize_tolerates_missing_fields() {
        let metadata = normalize(&json!({ "format": { "duration": "N/A" } }));
        assert_eq!(metadata.duration(), None);
        assert!(metadata.streams.is_empty());

        let metadata = normalize(&json!({}));
        assert_eq!(metadata, MediaMetadata::default());
    }

    #[test]
    fn test_metadata_field_names() {
        let metadata = MediaMetadata {
            format: FormatInfo { duration: Some(4.0), size: Some(1024), bit_rate: Some(2048) },
            streams: vec![
                StreamInfo {
                    stream_type: StreamType::Video,
                    codec: Some("vp9".into()),
                    width: Some(640),
                    height: Some(360),
                    frame_rate: Some(25.0),
                    sample_rate: None,
                    channels: None,
                },
                StreamInfo {
                    stream_type: StreamType::Audio,
                    codec: Some("opus".into()),
                    width: None,
                    height: None,
                    frame_rate: None,
                    sample_rate: Some(48000),
                    channels: Some(2),
                },
            ],
        };
        let value = serde_json::to_value(&metadata).unwrap();

        assert_eq!(value["format"]["duration"], 4.0);
        assert_eq!(value["format"]["size"], 1024);
        assert_eq!(value["format"]["bitRate"], 2048);
        assert_eq!(value["format"].as_object().unwrap().len(), 3);
        assert_eq!(value["streams"][0]["type"], "video");
        assert_eq!(value["streams"][0]["frameRate"], 25.0);
        assert_eq!(value["streams"][1]["sampleRate"], 48000);
        assert_eq!(value["streams"][1]["channels"], 2);
        assert!(value["streams"][0].get("frame_rate").is_none());

        let back: MediaMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_classify_stderr() {
        let url = "https://cdn.example.com/a.mp4";
        assert_eq!(
            classify_stderr(url, "Server returned 404 Not Found").kind(),
            "not_found"
        );
        assert_eq!(
            classify_stderr(url, "HTTP error 403 Forbidden").kind(),
            "forbidden"
        );
        assert_eq!(
            classify_stderr(url, "Connection timed out").kind(),
            "timeout"
        );
        assert_eq!(
            classify_stderr(url, "moov atom not found\nInvalid data found").kind(),
            "unknown"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_not_found() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = format!("http://127.0.0.1:{}/clip.mp4", port);
        let result = prober(5.0).probe(&url).await;
        assert_eq!(result.unwrap_err(), ProbeError::NotFound { url });
    }

    #[tokio::test]
    async fn test_forbidden_asset() {
        let app = Router::new().fallback(|| async { AxumStatus::FORBIDDEN });
        let addr = serve(app).await;

        let url = format!("http://{}/private.mp4", addr);
        let result = prober(5.0).probe(&url).await;
        assert!(matches!(result, Err(ProbeError::Forbidden { .. })));
    }

    #[tokio::test]
    async fn test_missing_asset() {
        let app = Router::new().fallback(|| async { AxumStatus::NOT_FOUND });
        let addr = serve(app).await;

        let result = prober(5.0).probe(&format!("http://{}/gone.mp4", addr)).await;
        assert!(matches!(result, Err(ProbeError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_slow_host_times_out() {
        let app = Router::new().fallback(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            AxumStatus::OK
        });
        let addr = serve(app).await;

        let result = prober(0.2).probe(&format!("http://{}/slow.mp4", addr)).await;
        assert!(matches!(result, Err(ProbeError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_rejects_non_http_urls() {
        let result = prober(1.0).probe("file:///etc/passwd").await;
        assert!(matches!(result, Err(ProbeError::Unknown { .. })));
    }
}
