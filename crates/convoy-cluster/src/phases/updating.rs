//! Updating phase handler.
//!
//! Runs [`UPDATE_SAGA`] step by step. A step whose precondition does not hold
//! is skipped; a failing step aborts the rest. Each committed write updates
//! the secret store immediately, so re-running the whole update after a
//! partial failure skips what already converged.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use convoy_common::types::{ClusterPhase, DesiredSpec, PoolWriteMode};
use convoy_common::Error;

use super::transition;
use crate::controller::{ClusterReconciler, ReconcileOutput};
use crate::operation::{call, OperationWaiter};
use crate::payload::{default_pool, expand_service_principal, flatten};
use crate::saga::{SagaContext, UpdateStep, UPDATE_SAGA};
use crate::secrets::{SecretField, SecretStore};
use crate::sections::ClusterSection;

/// Converge an existing cluster in place
#[instrument(skip_all, fields(cluster = %desired.id()))]
pub async fn handle_updating(
    reconciler: &ClusterReconciler,
    desired: &DesiredSpec,
    secrets: &mut SecretStore,
    cancel: &CancellationToken,
) -> Result<ReconcileOutput, Error> {
    let id = desired.id();
    let cluster = id.to_string();

    desired
        .validate(PoolWriteMode::Update)
        .map_err(|e| e.in_section(&cluster, "validation"))?;

    let base = reconciler
        .fetch(&id, cancel)
        .await
        .and_then(|found| found.ok_or_else(|| Error::not_found(&cluster)))
        .map_err(|e| e.in_section(&cluster, "read"))?;
    let pool_name = Some(desired.default_node_pool.name.as_str());
    let observed =
        flatten(&id, &base, pool_name, secrets).map_err(|e| e.in_section(&cluster, "read"))?;

    let mut ctx = SagaContext::new(desired, observed, base);
    let waiter = reconciler.waiter(reconciler.config().update_timeout());
    let mut phase = ClusterPhase::Ready;
    let mut output = None;

    for step in UPDATE_SAGA {
        if !step.precondition(&ctx) {
            debug!(step = %step, "nothing to do, skipping");
            continue;
        }
        if step.mutates() {
            phase = transition(&id, phase, ClusterPhase::Updating)?;
        }
        if step == UpdateStep::FinalRead {
            phase = transition(&id, phase, ClusterPhase::Ready)?;
        }

        output = run_step(reconciler, step, &mut ctx, secrets, &waiter, phase, cancel)
            .await
            .map_err(|e| e.in_section(&cluster, step.section()))?
            .or(output);

        if step.mutates() {
            ctx.committed.push(step);
            info!(step = %step, "update step committed");
        }
    }

    output.ok_or_else(|| {
        Error::internal_with_context("saga", "update finished without a final read")
            .in_section(&cluster, UpdateStep::FinalRead.section())
    })
}

async fn run_step(
    reconciler: &ClusterReconciler,
    step: UpdateStep,
    ctx: &mut SagaContext<'_>,
    secrets: &mut SecretStore,
    waiter: &OperationWaiter,
    phase: ClusterPhase,
    cancel: &CancellationToken,
) -> Result<Option<ReconcileOutput>, Error> {
    let timeout = reconciler.config().read_timeout();
    let desired = ctx.desired;

    match step {
        UpdateStep::ResetServicePrincipal => {
            let Some(sp) = desired.service_principal.as_ref() else {
                return Ok(None);
            };
            let profile = expand_service_principal(sp);
            let handle = call(
                "reset service principal",
                timeout,
                cancel,
                reconciler
                    .clusters()
                    .reset_service_principal(&ctx.id, &profile),
            )
            .await?;
            waiter.wait(handle, cancel).await?;
            secrets.record(SecretField::ServicePrincipalSecret, &sp.client_secret);
            Ok(None)
        }

        UpdateStep::RefreshBase => {
            let base = reconciler
                .fetch(&ctx.id, cancel)
                .await?
                .ok_or_else(|| Error::not_found(ctx.id.to_string()))?;
            ctx.observed = flatten(
                &ctx.id,
                &base,
                Some(&desired.default_node_pool.name),
                secrets,
            )?;
            ctx.base = base;
            Ok(None)
        }

        UpdateStep::ApplyClusterSections => {
            let sections = ctx.changed_sections();
            debug!(sections = ?sections.iter().map(|s| s.name()).collect::<Vec<_>>(), "applying sections");
            let payload = sections
                .iter()
                .fold(ctx.base.clone(), |base, section| section.apply(base, desired));

            let handle = call(
                "update cluster",
                timeout,
                cancel,
                reconciler.clusters().create_or_update(&ctx.id, &payload),
            )
            .await?;
            waiter.wait(handle, cancel).await?;

            if sections.contains(&ClusterSection::RbacProfile) {
                secrets.record(
                    SecretField::IdentityProviderServerSecret,
                    SecretField::IdentityProviderServerSecret.value_in(desired),
                );
            }
            if sections.contains(&ClusterSection::WindowsProfile) {
                secrets.record(
                    SecretField::WindowsAdminPassword,
                    SecretField::WindowsAdminPassword.value_in(desired),
                );
            }
            ctx.base = payload;
            Ok(None)
        }

        UpdateStep::ApplyNodePool => {
            let base_pool = default_pool(&ctx.base, Some(&desired.default_node_pool.name)).cloned();
            reconciler
                .node_pools()
                .apply(
                    &ctx.id,
                    &desired.default_node_pool,
                    PoolWriteMode::Update,
                    base_pool.as_ref(),
                    waiter,
                    cancel,
                )
                .await?;
            Ok(None)
        }

        UpdateStep::UpgradeVersion => {
            let mut base = reconciler
                .fetch(&ctx.id, cancel)
                .await?
                .ok_or_else(|| Error::not_found(ctx.id.to_string()))?;
            info!(
                from = ?base.properties.kubernetes_version,
                to = %desired.kubernetes_version,
                "upgrading kubernetes version"
            );
            base.properties.kubernetes_version = Some(desired.kubernetes_version.clone());

            let handle = call(
                "upgrade kubernetes version",
                timeout,
                cancel,
                reconciler.clusters().create_or_update(&ctx.id, &base),
            )
            .await?;
            waiter.wait(handle, cancel).await?;
            ctx.base = base;
            Ok(None)
        }

        UpdateStep::FinalRead => {
            let base = reconciler
                .fetch(&ctx.id, cancel)
                .await?
                .ok_or_else(|| Error::not_found(ctx.id.to_string()))?;
            let output = reconciler
                .collect_output(
                    &ctx.id,
                    &base,
                    Some(&desired.default_node_pool.name),
                    secrets,
                    phase,
                    cancel,
                )
                .await?;
            ctx.observed = output.observed.clone();
            ctx.base = base;
            Ok(Some(output))
        }
    }
}
