//! Make sure the images a database needs are present locally

use crate::progress::{ProgressView, PullProgress};
use crate::{CoreError, Result};
use dbin_provider::{ContainerProvider, PullEvent};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Pull `image` unless the engine already has it.
///
/// Pull progress is aggregated per layer and redrawn on stderr while the
/// pull runs. No container is touched here, so a failure leaves nothing to
/// clean up.
pub async fn ensure_image(provider: &dyn ContainerProvider, image: &str) -> Result<()> {
    let present = provider.image_exists(image).await.map_err(|e| CoreError::Pull {
        image: image.to_string(),
        message: e.to_string(),
    })?;
    if present {
        debug!("Image {} already present", image);
        return Ok(());
    }

    info!("Pulling image {}", image);
    let (tx, mut rx) = mpsc::unbounded_channel::<PullEvent>();

    let render = async move {
        let mut progress = PullProgress::new();
        let mut view = ProgressView::stderr();
        while let Some(event) = rx.recv().await {
            debug!(
                status = %event.status,
                layer = event.layer_id.as_deref().unwrap_or(""),
                "pull progress"
            );
            if progress.apply(&event) {
                if let Err(e) = view.draw(&progress) {
                    debug!("Failed to draw pull progress: {}", e);
                }
            }
        }
    };

    // The sender moves into the pull future, so the render loop ends with it
    let (result, ()) = tokio::join!(provider.pull(image, tx), render);
    result.map_err(|e| CoreError::Pull {
        image: image.to_string(),
        message: e.to_string(),
    })?;

    info!("Pulled image {}", image);
    Ok(())
}

/// Ensure every image in order, stopping at the first failure
pub async fn ensure_images(provider: &dyn ContainerProvider, images: &[&str]) -> Result<()> {
    for image in images {
        ensure_image(provider, image).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockCall, MockProvider};
    use dbin_provider::{ProviderError, ProviderType};

    #[tokio::test]
    async fn test_present_image_not_pulled() {
        let mock = MockProvider::new(ProviderType::Docker);
        ensure_image(&mock, "redis:latest").await.unwrap();
        assert!(!mock
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::Pull { .. })));
    }

    #[tokio::test]
    async fn test_missing_image_pulled_with_events() {
        let mock = MockProvider::new(ProviderType::Docker);
        mock.missing_images.lock().unwrap().insert("redis:latest".to_string());
        *mock.pull_events.lock().unwrap() = vec![PullEvent {
            status: "Downloading".to_string(),
            layer_id: Some("abc".to_string()),
            progress_text: Some("[=>  ]".to_string()),
            current_bytes: Some(1),
            total_bytes: Some(2),
        }];

        ensure_image(&mock, "redis:latest").await.unwrap();
        assert!(mock.was_called(&MockCall::Pull {
            image: "redis:latest".to_string()
        }));
    }

    #[tokio::test]
    async fn test_pull_failure_reported() {
        let mock = MockProvider::new(ProviderType::Docker);
        mock.missing_images.lock().unwrap().insert("nope:latest".to_string());
        *mock.pull_result.lock().unwrap() =
            Err(ProviderError::PullError("manifest unknown".to_string()));

        let err = ensure_images(&mock, &["nope:latest", "redis:latest"])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Pull { ref image, .. } if image == "nope:latest"));
        // Stops at the first failure
        assert!(!mock.was_called(&MockCall::ImageExists {
            image: "redis:latest".to_string()
        }));
    }
}
