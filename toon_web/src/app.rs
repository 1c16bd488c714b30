use crate::config::Config;
use crate::server::HttpServer;
use std::error::Error;
use std::sync::Arc;
use toon_prediction::{ModelLoader, ModelService};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let loader = ModelLoader::new(config.model.artifact_path());

    // A load failure is terminal: no listener is bound and the process
    // reports the category of the failure and exits.
    let classifier: Arc<dyn ModelService> = match loader.load() {
        Ok(model) => model,
        Err(e) => {
            tracing::error!("Failed to load classification model: {e}");
            return Err(Box::new(e));
        }
    };

    tracing::info!(
        "Serving classifier for labels {:?}",
        classifier.class_labels()
    );

    let server = HttpServer::new(classifier, &config).await?;
    server.run().await?;

    Ok(())
}
