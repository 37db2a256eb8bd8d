use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use anyhow::{Context, Result};
use image::GenericImageView;
use tracing::{debug, info};

use crate::services::image_ref::candidate_urls;

#[derive(Clone)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

pub enum PreloadEvent {
    Loaded {
        reference: String,
        image: DecodedImage,
    },
    Failed {
        reference: String,
        message: String,
    },
}

impl PreloadEvent {
    pub fn reference(&self) -> &str {
        match self {
            PreloadEvent::Loaded { reference, .. } | PreloadEvent::Failed { reference, .. } => {
                reference
            }
        }
    }
}

/// Fetches and decodes one batch of label images off the UI thread.
/// Dropping it closes the channel; results still in flight are discarded.
pub struct ImagePreloader {
    rx: Receiver<PreloadEvent>,
    pending: HashSet<String>,
}

impl ImagePreloader {
    pub fn spawn(references: Vec<String>, max_dimension: u32) -> Self {
        let pending: HashSet<String> = references.iter().cloned().collect();
        let (tx, rx) = mpsc::channel::<PreloadEvent>();

        if references.is_empty() {
            return Self { rx, pending };
        }

        thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(err) => {
                    for reference in references {
                        let _ = tx.send(PreloadEvent::Failed {
                            reference,
                            message: format!("failed to initialize preload runtime: {err}"),
                        });
                    }
                    return;
                }
            };

            runtime.block_on(async move {
                let client = reqwest::Client::new();
                let total = references.len();
                let mut handles = Vec::with_capacity(total);
                for reference in references {
                    let client = client.clone();
                    let tx = tx.clone();
                    handles.push(tokio::spawn(async move {
                        let event = match load_reference(&client, &reference, max_dimension).await
                        {
                            Ok(image) => PreloadEvent::Loaded { reference, image },
                            Err(err) => {
                                debug!("Image {} exhausted every candidate URL", reference);
                                PreloadEvent::Failed {
                                    reference,
                                    message: format!("{err:#}"),
                                }
                            }
                        };
                        tx.send(event).is_ok()
                    }));
                }

                let mut delivered = 0usize;
                for handle in handles {
                    if handle.await.unwrap_or(false) {
                        delivered += 1;
                    }
                }
                info!("Image preload finished: {}/{} delivered", delivered, total);
            });
        });

        Self { rx, pending }
    }

    pub fn poll(&mut self) -> Vec<PreloadEvent> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    self.pending.remove(event.reference());
                    events.push(event);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.pending.is_empty() {
                        debug!("Preload channel closed with {} pending", self.pending.len());
                        self.pending.clear();
                    }
                    break;
                }
            }
        }
        events
    }

    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

async fn load_reference(
    client: &reqwest::Client,
    reference: &str,
    max_dimension: u32,
) -> Result<DecodedImage> {
    let urls = candidate_urls(reference);
    let mut last_error = anyhow::anyhow!("no usable URL in {reference:?}");
    for url in urls {
        match fetch_image(client, &url, max_dimension).await {
            Ok(image) => return Ok(image),
            Err(err) => {
                debug!("Candidate {} failed: {:#}", url, err);
                last_error = err;
            }
        }
    }
    Err(last_error)
}

async fn fetch_image(
    client: &reqwest::Client,
    url: &str,
    max_dimension: u32,
) -> Result<DecodedImage> {
    let bytes = client
        .get(url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .with_context(|| format!("GET {url}"))?
        .bytes()
        .await
        .with_context(|| format!("reading body of {url}"))?;

    tokio::task::spawn_blocking(move || decode_image(&bytes, max_dimension))
        .await
        .context("decode task panicked")?
        .with_context(|| format!("decoding {url}"))
}

pub fn decode_image(bytes: &[u8], max_dimension: u32) -> Result<DecodedImage> {
    let mut decoded = image::load_from_memory(bytes).context("unsupported image data")?;
    let (width, height) = decoded.dimensions();
    if width.max(height) > max_dimension {
        decoded = decoded.resize(
            max_dimension,
            max_dimension,
            image::imageops::FilterType::Triangle,
        );
    }
    let rgba = decoded.to_rgba8();
    Ok(DecodedImage {
        width: rgba.width() as usize,
        height: rgba.height() as usize,
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let buffer = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 120, 20, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(buffer)
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn wait_until_finished(preloader: &mut ImagePreloader) -> Vec<PreloadEvent> {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = Vec::new();
        while !preloader.is_finished() && Instant::now() < deadline {
            events.extend(preloader.poll());
            std::thread::sleep(Duration::from_millis(10));
        }
        events
    }

    #[test]
    fn decode_shrinks_large_images() {
        let decoded = decode_image(&png(400, 200), 100).unwrap();
        assert_eq!((decoded.width, decoded.height), (100, 50));
        assert_eq!(decoded.rgba.len(), 100 * 50 * 4);
    }

    #[test]
    fn decode_keeps_small_images_and_rejects_garbage() {
        let decoded = decode_image(&png(20, 30), 100).unwrap();
        assert_eq!((decoded.width, decoded.height), (20, 30));
        assert!(decode_image(b"not an image", 100).is_err());
    }

    #[test]
    fn empty_batch_is_finished_immediately() {
        let preloader = ImagePreloader::spawn(Vec::new(), 100);
        assert!(preloader.is_finished());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failures_count_as_finished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(8, 8)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let ok = format!("{}/ok.png", server.uri());
        let missing = format!("{}/missing.png", server.uri());
        let mut preloader = ImagePreloader::spawn(vec![ok.clone(), missing.clone()], 100);

        let events = tokio::task::spawn_blocking(move || {
            let events = wait_until_finished(&mut preloader);
            (preloader.is_finished(), events)
        })
        .await
        .unwrap();

        assert!(events.0);
        let loaded: Vec<&str> = events
            .1
            .iter()
            .filter(|e| matches!(e, PreloadEvent::Loaded { .. }))
            .map(PreloadEvent::reference)
            .collect();
        let failed: Vec<&str> = events
            .1
            .iter()
            .filter(|e| matches!(e, PreloadEvent::Failed { .. }))
            .map(PreloadEvent::reference)
            .collect();
        assert_eq!(loaded, vec![ok.as_str()]);
        assert_eq!(failed, vec![missing.as_str()]);
        let reason = events.1.iter().find_map(|e| match e {
            PreloadEvent::Failed { message, .. } => Some(message.as_str()),
            PreloadEvent::Loaded { .. } => None,
        });
        assert!(reason.is_some_and(|m| m.contains("404")), "{reason:?}");
    }
}
