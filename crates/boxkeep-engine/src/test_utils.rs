//! Gating for tests that need a live container engine.

use bollard::Docker;

/// Whether the engine at the local defaults (`DOCKER_HOST` or the platform
/// socket) answers a ping.
pub async fn engine_available() -> bool {
    match Docker::connect_with_local_defaults() {
        Ok(docker) => docker.ping().await.is_ok(),
        Err(_) => false,
    }
}

/// Same as [`engine_available`] for an explicit unix socket.
#[cfg(unix)]
pub async fn engine_available_at(socket: &str) -> bool {
    match Docker::connect_with_unix(socket, 2, bollard::API_DEFAULT_VERSION) {
        Ok(docker) => docker.ping().await.is_ok(),
        Err(_) => false,
    }
}

/// Returns early from an async test when no engine answers.
#[macro_export]
macro_rules! require_docker {
    () => {
        if !$crate::test_utils::engine_available().await {
            eprintln!("skipping: no container engine answered a ping");
            return;
        }
    };
}
