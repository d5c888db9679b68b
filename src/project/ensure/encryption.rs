//! KMS key ring and crypto key.

use crate::error::DeployError;
use crate::poller::guarded;

use super::Context;

/// Full names of the key ring and crypto key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Keys {
    /// Full key ring name.
    pub key_ring: String,
    /// Full crypto key name.
    pub crypto_key: String,
}

/// Ensures the key ring and key exist; an existing key is read back.
///
/// # Errors
///
/// Returns the first lookup or create failure.
pub async fn ensure(ctx: &mut Context<'_>) -> Result<Keys, DeployError> {
    let keys = ctx.clients().keys.as_ref();
    let config = ctx.config();
    let (project, region) = (ctx.project(), ctx.region());

    let get_ring = format!("get key ring {}", config.key_ring_name);
    let ring = if let Some(existing) = ctx
        .lookup(&get_ring, keys.get_key_ring(project, region, &config.key_ring_name))
        .await?
    {
        existing
    } else {
        let action = format!("create key ring {}", config.key_ring_name);
        if let Some(created) = ctx
            .submit(
                &action,
                keys.create_key_ring(project, region, &config.key_ring_name),
            )
            .await?
        {
            ctx.record_change(format!("key ring {}", config.key_ring_name));
            created
        } else {
            guarded(
                ctx.cancel,
                &get_ring,
                keys.get_key_ring(project, region, &config.key_ring_name),
            )
            .await?
        }
    };

    let get_key = format!("get crypto key {}", config.crypto_key_name);
    let key = if let Some(existing) = ctx
        .lookup(&get_key, keys.get_crypto_key(&ring.name, &config.crypto_key_name))
        .await?
    {
        existing
    } else {
        let action = format!("create crypto key {}", config.crypto_key_name);
        if let Some(created) = ctx
            .submit(
                &action,
                keys.create_crypto_key(&ring.name, &config.crypto_key_name),
            )
            .await?
        {
            ctx.record_change(format!("crypto key {}", config.crypto_key_name));
            created
        } else {
            guarded(
                ctx.cancel,
                &get_key,
                keys.get_crypto_key(&ring.name, &config.crypto_key_name),
            )
            .await?
        }
    };

    Ok(Keys {
        key_ring: ring.name,
        crypto_key: key.name,
    })
}

/// Schedules destruction of the key's versions. The key ring and key
/// themselves are permanent.
///
/// # Errors
///
/// Returns the destroy failure other than not-found.
pub async fn teardown(ctx: &Context<'_>) -> Result<(), DeployError> {
    let config = ctx.config();
    let key = format!(
        "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
        config.project_id, config.region, config.key_ring_name, config.crypto_key_name
    );
    ctx.remove_now(
        &format!("destroy versions of {}", config.crypto_key_name),
        ctx.clients().keys.destroy_key_versions(&key),
    )
    .await
}
