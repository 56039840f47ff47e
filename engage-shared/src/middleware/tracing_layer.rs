use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber: JSON lines when `ENGAGE_ENV=production`,
/// human-readable output otherwise. `RUST_LOG` overrides the default filter.
pub fn init_tracing(service_name: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));
    let registry = tracing_subscriber::registry().with(env_filter);

    if is_production() {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_target(true),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }

    tracing::info!(service = service_name, production = is_production(), "tracing initialized");
}

/// Targets use the crate's module path, so `engage-integrity` filters as `engage_integrity`.
fn default_directives(service_name: &str) -> String {
    let target = service_name.replace('-', "_");
    format!("info,{target}=debug,engage_shared=info,tower_http=debug")
}

fn is_production() -> bool {
    std::env::var("ENGAGE_ENV").is_ok_and(|v| v.eq_ignore_ascii_case("production"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_maps_to_crate_target() {
        let directives = default_directives("engage-integrity");
        assert!(directives.contains("engage_integrity=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
