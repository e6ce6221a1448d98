#[tokio::main]
async fn main() {
    use atelier_console::{
        config::ConsoleConfig, navigator::LoggingNavigator, provider::HttpIdentityProvider,
    };
    use atelier_session::{FileKeyValueStore, LifecycleState, SessionCoordinator};
    use std::sync::Arc;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ConsoleConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let provider = Arc::new(
        HttpIdentityProvider::new(config.provider.clone())
            .expect("failed to create identity provider"),
    );
    let storage = Arc::new(FileKeyValueStore::new(config.state_file.clone()));
    let navigator = Arc::new(LoggingNavigator::new(config.entry_path.clone()));
    let coordinator =
        SessionCoordinator::new(provider.clone(), storage, navigator, &config.session);

    if let Some(destination) = &config.intended_destination {
        coordinator.remember_intended_destination(destination);
    }

    let mut states = coordinator.watch();
    coordinator.start().await;

    if !coordinator.current_state().is_authenticated() {
        match &config.provider.bootstrap_refresh_token {
            Some(refresh_token) => {
                if let Err(e) = provider.sign_in_with_refresh_token(refresh_token).await {
                    tracing::warn!(error = %e, "Bootstrap sign-in failed");
                }
            }
            None => tracing::info!("No session; waiting for sign-in"),
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                match &*states.borrow_and_update() {
                    LifecycleState::Authenticated { identity, session } => tracing::info!(
                        identity = %identity.id(),
                        expires_at = %session.expires_at(),
                        "Session active"
                    ),
                    state => tracing::info!(state = state.name(), "Session state changed"),
                }
            }
        }
    }

    coordinator.teardown();
}
