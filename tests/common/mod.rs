//! Shared fixtures for integration tests: encoded images, deterministic
//! inference backends and a one-shot HTTP server.

#![allow(dead_code)]

use bgremove_service::{
    config::{ModelConfig, OutputActivation, PreprocessingConfig},
    error::{BgRemovalError, Result},
    inference::{InferenceBackend, InferenceEngine},
    processor::BackgroundRemovalService,
    resolver::ImageSourceResolver,
};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use instant::Duration;
use ndarray::Array4;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Gradient image whose pixels differ with `seed`
pub fn patterned_rgb(width: u32, height: u32, seed: u8) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let r = ((x * 7 + u32::from(seed) * 13) % 256) as u8;
        let g = ((y * 5 + u32::from(seed) * 29) % 256) as u8;
        let b = ((x + y + u32::from(seed)) % 256) as u8;
        Rgb([r, g, b])
    })
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
    buffer
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(patterned_rgb(width, height, 1)), ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    encode(&DynamicImage::ImageRgb8(patterned_rgb(width, height, 2)), ImageFormat::Jpeg)
}

/// Emits every output value as `value`
#[derive(Debug, Clone)]
pub struct ConstantBackend {
    value: f32,
}

impl ConstantBackend {
    pub fn new(value: f32) -> Self {
        Self { value }
    }
}

impl InferenceBackend for ConstantBackend {
    fn initialize(&mut self, _config: &ModelConfig) -> Result<Option<Duration>> {
        Ok(None)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let shape = input.shape();
        Ok(Array4::from_elem((1, 1, shape[2], shape[3]), self.value))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, 1024, 1024)
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "constant"
    }
}

/// Echoes the first input channel as logits and records how many forward
/// passes are in flight at once
#[derive(Debug, Clone, Default)]
pub struct EchoBackend {
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
    pub calls: Arc<AtomicUsize>,
    pub dwell: Duration,
}

impl EchoBackend {
    pub fn with_dwell(dwell: Duration) -> Self {
        Self {
            dwell,
            ..Self::default()
        }
    }
}

impl InferenceBackend for EchoBackend {
    fn initialize(&mut self, _config: &ModelConfig) -> Result<Option<Duration>> {
        Ok(None)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now_active, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        std::thread::sleep(self.dwell);

        let shape = input.shape();
        if shape.len() != 4 || shape[0] != 1 || shape[1] != 3 {
            self.active.fetch_sub(1, Ordering::SeqCst);
            return Err(BgRemovalError::inference(format!("unexpected input {shape:?}")));
        }
        let (height, width) = (shape[2], shape[3]);
        let output = Array4::from_shape_fn((1, 1, height, width), |(_, _, y, x)| input[[0, 0, y, x]]);

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(output)
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, 1024, 1024)
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

pub fn preprocessing(width: u32, height: u32) -> PreprocessingConfig {
    PreprocessingConfig {
        target_size: [width, height],
        ..PreprocessingConfig::default()
    }
}

/// Engine whose every mask value is 255
pub fn opaque_engine(working: (u32, u32)) -> Arc<InferenceEngine> {
    Arc::new(InferenceEngine::new(
        Box::new(ConstantBackend::new(1.0)),
        preprocessing(working.0, working.1),
        OutputActivation::Identity,
    ))
}

pub fn echo_engine(backend: EchoBackend, working: (u32, u32)) -> Arc<InferenceEngine> {
    Arc::new(InferenceEngine::new(
        Box::new(backend),
        preprocessing(working.0, working.1),
        OutputActivation::Sigmoid,
    ))
}

pub fn resolver() -> ImageSourceResolver {
    ImageSourceResolver::new(std::time::Duration::from_secs(5)).unwrap()
}

pub fn service_with(engine: Arc<InferenceEngine>) -> BackgroundRemovalService {
    BackgroundRemovalService::new(resolver(), engine)
}

/// Serve exactly one HTTP response on an ephemeral port and return its URL
pub async fn serve_once(status: u16, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };

        let mut request = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    request.extend_from_slice(&chunk[..n]);
                    if request.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                },
            }
        }

        let reason = match status {
            200 => "OK",
            404 => "Not Found",
            _ => "Error",
        };
        let head = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&body).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}/image.png")
}
