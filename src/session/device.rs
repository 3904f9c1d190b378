//! Voice-isolation transform capability.

use crate::error::{GuidecastError, Result};
use crate::session::adapter::{Device, TransformedDevice};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Platform noise/echo suppression that wraps a capture device.
#[async_trait]
pub trait VoiceIsolation: Send + Sync {
    /// Whether the platform can apply the transform at all.
    async fn is_supported(&self) -> Result<bool>;

    async fn transform(&self, device: &Device, model: &str) -> Result<TransformedDevice>;
}

#[async_trait]
impl<T: VoiceIsolation + ?Sized> VoiceIsolation for Arc<T> {
    async fn is_supported(&self) -> Result<bool> {
        (**self).is_supported().await
    }

    async fn transform(&self, device: &Device, model: &str) -> Result<TransformedDevice> {
        (**self).transform(device, model).await
    }
}

/// For platforms without voice isolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVoiceIsolation;

#[async_trait]
impl VoiceIsolation for NoVoiceIsolation {
    async fn is_supported(&self) -> Result<bool> {
        Ok(false)
    }

    async fn transform(&self, device: &Device, _model: &str) -> Result<TransformedDevice> {
        Err(GuidecastError::Other(format!(
            "voice isolation unavailable for {}",
            device.id
        )))
    }
}

/// Mock voice isolation for testing
#[derive(Debug, Clone, Default)]
pub struct MockVoiceIsolation {
    supported: bool,
    probe_fails: bool,
    transform_fails: bool,
    transforms: Arc<AtomicUsize>,
}

impl MockVoiceIsolation {
    pub fn supported() -> Self {
        Self {
            supported: true,
            ..Self::default()
        }
    }

    pub fn unsupported() -> Self {
        Self::default()
    }

    /// Make the capability probe itself fail.
    pub fn with_probe_failure(mut self) -> Self {
        self.probe_fails = true;
        self
    }

    pub fn with_transform_failure(mut self) -> Self {
        self.transform_fails = true;
        self
    }

    pub fn transform_count(&self) -> usize {
        self.transforms.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceIsolation for MockVoiceIsolation {
    async fn is_supported(&self) -> Result<bool> {
        if self.probe_fails {
            return Err(GuidecastError::Other("mock probe failure".to_string()));
        }
        Ok(self.supported)
    }

    async fn transform(&self, device: &Device, model: &str) -> Result<TransformedDevice> {
        self.transforms.fetch_add(1, Ordering::SeqCst);
        if self.transform_fails {
            return Err(GuidecastError::Other("mock transform failure".to_string()));
        }
        Ok(TransformedDevice {
            inner: device.clone(),
            model: model.to_string(),
        })
    }
}
