// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::{Arc, OnceLock, RwLock};

use thiserror::Error;

use rpc_common::formatter::{FieldFormatter, NameFormatter, UnknownFormatterError};

use crate::{
    env::{EnvError, Environment, SystemEnvironment},
    env_const::{
        DEFAULT_FIELD_FORMATTER, RPC_INPUT_FIELD_FORMATTER, RPC_OUTPUT_FIELD_FORMATTER,
        RPC_REQUIRE_TENANT_PARAMETERS,
    },
};

/// Bridge-wide settings. Immutable once built; change it by swapping in a new value through a
/// [`ConfigHandle`].
#[derive(Clone, Debug, Default)]
pub struct RpcConfig {
    pub formatter: NameFormatter,
    /// Require a `tenant` in requests targeting multitenant resources
    pub require_tenant_parameters: bool,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {source}")]
    Formatter {
        key: &'static str,
        #[source]
        source: UnknownFormatterError,
    },

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl RpcConfig {
    pub fn from_env(env: &dyn Environment) -> Result<Self, ConfigError> {
        let formatter_from = |key: &'static str| {
            env.get_or_else(key, DEFAULT_FIELD_FORMATTER)
                .parse::<FieldFormatter>()
                .map_err(|source| ConfigError::Formatter { key, source })
        };

        Ok(Self {
            formatter: NameFormatter::new(
                formatter_from(RPC_INPUT_FIELD_FORMATTER)?,
                formatter_from(RPC_OUTPUT_FIELD_FORMATTER)?,
            ),
            require_tenant_parameters: env.enabled(RPC_REQUIRE_TENANT_PARAMETERS, false)?,
        })
    }

    pub fn with_formatter(mut self, formatter: NameFormatter) -> Self {
        self.formatter = formatter;
        self
    }
}

/// Shared, swappable configuration.
///
/// Readers take a snapshot (a cloned `Arc`) and keep using it for the rest of their request, so
/// a concurrent `replace` never changes settings halfway through a call.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<RpcConfig>>,
}

impl ConfigHandle {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// The process-wide handle, initialized from the system environment on first use.
    pub fn global() -> &'static ConfigHandle {
        static GLOBAL: OnceLock<ConfigHandle> = OnceLock::new();

        GLOBAL.get_or_init(|| {
            let config = RpcConfig::from_env(&SystemEnvironment).unwrap_or_else(|e| {
                tracing::warn!("Falling back to default RPC configuration: {e}");
                RpcConfig::default()
            });
            ConfigHandle::new(config)
        })
    }

    pub fn snapshot(&self) -> Arc<RpcConfig> {
        // A poisoned lock still holds a complete config (writers only swap the Arc)
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, config: RpcConfig) {
        *self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Arc::new(config);
    }
}
