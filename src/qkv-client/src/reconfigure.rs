//! The reconfiguration driver: announce, state transfer, activation,
//! and local commit, per spec.md §4.5.
//!
//! Unlike reads and writes, a reconfiguration is not idempotent under
//! races with another reconfiguration, so every step checks that the
//! goal meta-config hasn't already been superseded before continuing,
//! and bails out with [`Error::Superseded`] the moment it has, rather
//! than pushing half-migrated state further.

use qkv_proto::{MetaConfig, Timestamp};
use tracing::info;

use crate::client::Client;
use crate::quorum;
use crate::Error;

pub async fn reconfigure(client: &Client, new_adds: &str) -> Result<(), Error> {
    let goal_cfg = client.parse_descriptor(new_adds)?;
    let goal = MetaConfig {
        adds: new_adds.to_string(),
        started: false,
        time: Some(Timestamp::now()),
    };

    // 1. Announce: write the unstarted meta-config through the
    // traversal engine, so every replica still reachable along the
    // current chain learns about it.
    info!(adds = %new_adds, time = %goal.time.unwrap_or(Timestamp::MIN), "reconfigure: announcing goal meta-config");
    let announced = client.write_meta_config(goal.clone()).await?;
    if !announced.new {
        info!(adds = %new_adds, "reconfigure: announce lost the race, goal already superseded");
        return Err(Error::Superseded);
    }

    // 2. State transfer: enumerate every key visible through the
    // traversal engine (which by now funnels through the newly
    // announced meta-config too) and copy each one directly onto the
    // goal configuration's replica set.
    let goal_time = goal.time.unwrap_or(Timestamp::MIN);
    let keys = client.list().await?.keys;
    info!(adds = %new_adds, keys = keys.len(), "reconfigure: starting state transfer");
    for key in keys {
        let read = client.read(&key).await?;
        if !read.ok {
            continue;
        }
        let time = read.time.unwrap_or(Timestamp::MIN);
        quorum::quorum_write(client.transport().as_ref(), &goal_cfg.addrs, &key, &read.value, time).await?;

        if client.pcfg().await.time.unwrap_or(Timestamp::MIN) > goal_time {
            info!(adds = %new_adds, "reconfigure: superseded mid-transfer, abandoning goal");
            return Err(Error::Superseded);
        }
    }

    // 3. Activate: flip `started` on the goal set itself.
    info!(adds = %new_adds, "reconfigure: activating goal meta-config");
    let mut started_goal = goal.clone();
    started_goal.started = true;
    let activated =
        quorum::quorum_write_meta_config(client.transport().as_ref(), &goal_cfg.addrs, started_goal.clone()).await?;
    if !activated.new {
        info!(adds = %new_adds, "reconfigure: activation lost the race, goal already superseded");
        return Err(Error::Superseded);
    }

    // 4. Commit locally: adopt the now-started goal as the client's
    // active meta-config and default configuration.
    info!(adds = %new_adds, "reconfigure: committing locally");
    client.set_pcfg(started_goal).await;
    client.set_default_config(new_adds).await?;
    Ok(())
}
