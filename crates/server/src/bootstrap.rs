use std::sync::Arc;

use tracing::info;

use rowgate_gateway::{Dispatcher, DispatcherBuilder};

use crate::config::RowgateConfig;
use crate::error::ServerError;
use crate::functions::{BUILTINS, builtin};
use crate::gcp;
use crate::usage_factory::create_usage_store;

/// Assemble the dispatcher described by `config`.
///
/// Fails if the built-in computation is unknown, the usage store cannot be
/// created, or a cloud collaborator cannot be reached.
pub async fn build_dispatcher(config: &RowgateConfig) -> Result<Dispatcher, ServerError> {
    let builtin_name = config.function.builtin_name();
    let computation = builtin(builtin_name).ok_or_else(|| {
        ServerError::Config(format!(
            "unknown builtin function `{builtin_name}`; expected one of: {}",
            BUILTINS.join(", ")
        ))
    })?;

    let usage_store = create_usage_store(&config.quotas, &config.usage).await?;
    let collaborators = gcp::collaborators(&config.gcp, &config.function.name).await?;

    let mut builder = DispatcherBuilder::new()
        .function(config.function.name.as_str())
        .service_name(config.function.service_name.as_str())
        .quota_config(config.quotas.clone())
        .computation(computation)
        .context(Arc::new(collaborators.context))
        .error_reporter(collaborators.reporter);
    if let Some(store) = usage_store {
        builder = builder.usage_store(store);
    }
    let dispatcher = builder.build()?;

    info!(
        function = %dispatcher.function(),
        builtin = builtin_name,
        backend = dispatcher.quota().backend().label(),
        max_rows_per_query = ?config.quotas.max_rows_per_query,
        max_rows_per_user_per_day = ?config.quotas.max_rows_per_user_per_day,
        "dispatcher ready"
    );
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use rowgate_gateway::QuotaBackend;

    use super::*;

    #[tokio::test]
    async fn default_config_builds_echo() {
        let dispatcher = build_dispatcher(&RowgateConfig::default()).await.unwrap();
        assert_eq!(dispatcher.function().as_str(), "echo");
        assert!(matches!(dispatcher.quota().backend(), QuotaBackend::NoOp));
    }

    #[tokio::test]
    async fn builtin_can_differ_from_name() {
        let config = RowgateConfig::parse(
            r#"
            [function]
            name = "rank_customers"
            builtin = "dense_rank"

            [quotas]
            backend = "memory"
            max_rows_per_user_per_day = 100
            "#,
        )
        .unwrap();
        let dispatcher = build_dispatcher(&config).await.unwrap();
        assert_eq!(dispatcher.function().as_str(), "rank_customers");
        assert_eq!(dispatcher.quota().backend().label(), "memory");
    }

    #[tokio::test]
    async fn unknown_builtin_is_rejected() {
        let config = RowgateConfig::parse("[function]\nname = \"nope\"\n").unwrap();
        let err = build_dispatcher(&config).await.err().unwrap();
        let message = err.to_string();
        assert!(message.contains("unknown builtin function `nope`"));
        assert!(message.contains("echo, upper, dense_rank"));
    }
}
