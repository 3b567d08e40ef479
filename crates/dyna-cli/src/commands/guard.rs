//! Guard subcommands: store credentials and run the pipeline against
//! them, printing the grant or the structured denial.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use dyna_guards::{
    AuthGuard, AuthGuardOptions, CheckMode, ContextOverlay, GuardError, MiddlewareManager,
    PermissionGuard,
};
use dyna_store::{FileBackend, StorageBackend};

#[derive(Debug, Args)]
pub struct GuardArgs {
    /// Backing file for credential storage
    #[arg(long, default_value = ".dyna/credentials.json")]
    pub store: PathBuf,

    #[command(subcommand)]
    pub command: GuardCommand,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Every,
    Some,
    None,
}

impl From<ModeArg> for CheckMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Every => CheckMode::Every,
            ModeArg::Some => CheckMode::Some,
            ModeArg::None => CheckMode::None,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum GuardCommand {
    /// Store a bearer token (and optionally a refresh token)
    SetToken {
        token: String,
        #[arg(long)]
        refresh: Option<String>,
    },
    /// Remove stored credentials
    ClearToken,
    /// Run the authentication (and optional permission) pipeline
    Check {
        /// Permission required for access; repeatable
        #[arg(long = "required")]
        required: Vec<String>,
        /// How required permissions are evaluated
        #[arg(long, value_enum, default_value = "every")]
        mode: ModeArg,
        /// Fail expired tokens instead of attempting a refresh
        #[arg(long)]
        no_auto_refresh: bool,
    },
}

pub async fn execute(args: GuardArgs) -> Result<()> {
    let storage: Arc<dyn StorageBackend> = Arc::new(
        FileBackend::open(&args.store)
            .with_context(|| format!("cannot open credential file {}", args.store.display()))?,
    );

    match args.command {
        GuardCommand::SetToken { token, refresh } => {
            storage
                .set("auth_token", &token)
                .map_err(|e| anyhow!("storing token failed: {e}"))?;
            if let Some(refresh) = refresh {
                storage
                    .set("refresh_token", &refresh)
                    .map_err(|e| anyhow!("storing refresh token failed: {e}"))?;
            }
            println!("credentials stored");
        }
        GuardCommand::ClearToken => {
            for key in ["auth_token", "refresh_token"] {
                storage
                    .remove(key)
                    .map_err(|e| anyhow!("clearing {key} failed: {e}"))?;
            }
            println!("credentials cleared");
        }
        GuardCommand::Check {
            required,
            mode,
            no_auto_refresh,
        } => {
            check(storage, required, mode.into(), !no_auto_refresh).await?;
        }
    }

    Ok(())
}

async fn check(
    storage: Arc<dyn StorageBackend>,
    required: Vec<String>,
    mode: CheckMode,
    auto_refresh: bool,
) -> Result<()> {
    let manager = MiddlewareManager::new();
    manager.register(
        "authentication",
        Arc::new(AuthGuard::new(
            storage.clone(),
            AuthGuardOptions::default().with_auto_refresh(auto_refresh),
        )),
    );

    let mut names = vec!["authentication"];
    if !required.is_empty() {
        manager.register(
            "permission",
            Arc::new(PermissionGuard::new(required, storage).with_check_mode(mode)),
        );
        names.push("permission");
    }

    match manager.execute_by_name(&names, ContextOverlay::new()).await {
        Ok(result) => {
            println!("access granted");
            if let Some(user) = result.context.user() {
                println!("  user:        {}", user.id.as_deref().unwrap_or("-"));
                println!("  email:       {}", user.email.as_deref().unwrap_or("-"));
                println!("  roles:       {}", user.roles.join(", "));
                println!("  permissions: {}", user.permissions.join(", "));
            }
            Ok(())
        }
        Err(GuardError::Permission {
            code,
            required_permissions,
            missing_permissions,
            ..
        }) => Err(anyhow!(
            "access denied [{}]: required {:?}, missing {:?}",
            code.code(),
            required_permissions,
            missing_permissions,
        )),
        Err(error) => Err(anyhow!("access denied [{}]: {error}", error.code())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_arg_maps_to_check_mode() {
        assert_eq!(CheckMode::from(ModeArg::Every), CheckMode::Every);
        assert_eq!(CheckMode::from(ModeArg::Some), CheckMode::Some);
        assert_eq!(CheckMode::from(ModeArg::None), CheckMode::None);
    }
}
