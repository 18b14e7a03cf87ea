//! Test utilities and mock backends for testing inference functionality
//!
//! This module provides a mock implementation of the `InferenceBackend` trait
//! to enable testing without requiring model files or external runtimes.

use crate::{
    config::ModelConfig,
    error::{BgRemovalError, Result},
    inference::InferenceBackend,
};
use instant::Duration;
use ndarray::Array4;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
enum OutputPattern {
    /// Soft disc centered in the frame
    Circle,
    /// Every value set to the given constant
    Constant(f32),
}

/// Mock backend for testing
#[derive(Debug, Clone)]
pub struct MockBackend {
    /// Whether the backend has been initialized
    initialized: bool,
    /// Output generated for every call
    pattern: OutputPattern,
    /// Channel count of the generated output
    output_channels: usize,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
    /// Whether to simulate initialization failure
    should_fail_init: bool,
    /// Whether to simulate inference failure
    should_fail_inference: bool,
    /// Panic on the next inference call, then behave normally
    panic_next: bool,
}

impl MockBackend {
    /// Create a new mock backend with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            pattern: OutputPattern::Circle,
            output_channels: 1,
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail_init: false,
            should_fail_inference: false,
            panic_next: false,
        }
    }

    /// Mock whose every output value is `value`
    #[must_use]
    pub fn with_constant_output(value: f32) -> Self {
        let mut backend = Self::new();
        backend.pattern = OutputPattern::Constant(value);
        backend
    }

    /// Create a mock backend that will fail during initialization
    #[must_use]
    pub fn new_failing_init() -> Self {
        let mut backend = Self::new();
        backend.should_fail_init = true;
        backend
    }

    /// Create a mock backend that will fail during inference
    #[must_use]
    pub fn new_failing_inference() -> Self {
        let mut backend = Self::new();
        backend.should_fail_inference = true;
        backend
    }

    /// Create a mock backend whose first inference panics
    #[must_use]
    pub fn new_panicking_once() -> Self {
        let mut backend = Self::new();
        backend.panic_next = true;
        backend
    }

    /// Emit outputs with `channels` channels instead of one
    #[must_use]
    pub fn with_output_channels(mut self, channels: usize) -> Self {
        self.output_channels = channels;
        self
    }

    /// Shared handle to the call history, usable after the backend is boxed
    #[must_use]
    pub fn call_history_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.call_history)
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    /// Record a method call for testing verification
    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    /// Generate a mock output tensor at the input's spatial size
    fn generate_mock_output(&self, input: &Array4<f32>) -> Array4<f32> {
        let (batch_size, _, height, width) = input.dim();
        let shape = (batch_size, self.output_channels, height, width);

        match self.pattern {
            OutputPattern::Constant(value) => Array4::from_elem(shape, value),
            OutputPattern::Circle => {
                let center_x = width as f32 / 2.0;
                let center_y = height as f32 / 2.0;
                let radius = (width.min(height) as f32 / 3.0).max(1.0);

                Array4::from_shape_fn(shape, |(_, _, y, x)| {
                    let dx = x as f32 - center_x;
                    let dy = y as f32 - center_y;
                    let distance = (dx * dx + dy * dy).sqrt();
                    // Logit scale so the sigmoid yields a crisp disc
                    if distance < radius {
                        8.0
                    } else {
                        -8.0
                    }
                })
            },
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(&mut self, _config: &ModelConfig) -> Result<Option<Duration>> {
        self.record_call("initialize");

        if self.should_fail_init {
            return Err(BgRemovalError::model("Mock backend initialization failure"));
        }
        if self.initialized {
            return Ok(None);
        }

        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        self.record_call("infer");

        if !self.initialized {
            return Err(BgRemovalError::inference("Backend not initialized"));
        }
        if self.panic_next {
            self.panic_next = false;
            panic!("mock backend panic");
        }
        if self.should_fail_inference {
            return Err(BgRemovalError::inference("Mock inference failure"));
        }

        Ok(self.generate_mock_output(input))
    }

    fn input_shape(&self) -> (usize, usize, usize, usize) {
        (1, 3, 1024, 1024)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_backend_lifecycle() {
        let mut backend = MockBackend::new();
        assert!(!backend.is_initialized());

        let load_time = backend.initialize(&ModelConfig::default()).unwrap();
        assert!(load_time.is_some());
        assert!(backend.is_initialized());

        // Second initialization reports no load time
        assert!(backend.initialize(&ModelConfig::default()).unwrap().is_none());

        let input = Array4::<f32>::zeros((1, 3, 24, 24));
        let output = backend.infer(&input).unwrap();
        assert_eq!(output.shape(), &[1, 1, 24, 24]);
        // Center is foreground, corner is background
        assert!(output[[0, 0, 12, 12]] > 0.0);
        assert!(output[[0, 0, 0, 0]] < 0.0);

        assert_eq!(
            backend.get_call_history(),
            vec!["initialize", "initialize", "infer"]
        );
    }

    #[test]
    fn test_mock_backend_failures() {
        let mut backend = MockBackend::new_failing_init();
        assert!(backend.initialize(&ModelConfig::default()).is_err());

        let mut backend = MockBackend::new_failing_inference();
        backend.initialize(&ModelConfig::default()).unwrap();
        let err = backend.infer(&Array4::zeros((1, 3, 4, 4))).unwrap_err();
        assert!(matches!(err, BgRemovalError::InferenceFailure(_)));
    }

    #[test]
    fn test_mock_backend_output_channels() {
        let mut backend = MockBackend::with_constant_output(0.25).with_output_channels(2);
        backend.initialize(&ModelConfig::default()).unwrap();
        let output = backend.infer(&Array4::zeros((1, 3, 4, 6))).unwrap();
        assert_eq!(output.shape(), &[1, 2, 4, 6]);
        assert!(output.iter().all(|&v| (v - 0.25).abs() < f32::EPSILON));
    }
}
