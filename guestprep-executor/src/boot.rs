//! Start the guest and wait for its network address.

use std::net::IpAddr;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cancel::cancellable;
use crate::{DisplayMode, ExecutorError, GuestHandle, HypervisorControl};

/// Start `guest` and return the address its integration agent reports.
///
/// The address query blocks inside the hypervisor backend; there is no retry
/// loop here.
///
/// # Errors
/// Returns [`ExecutorError::Provisioning`] if start or the query fails,
/// [`ExecutorError::NoGuestAddress`] if the query answers without an address,
/// and [`ExecutorError::Cancelled`] if `cancel` fires first.
pub async fn boot<H: HypervisorControl + ?Sized>(
    hypervisor: &H,
    guest: &GuestHandle,
    mode: DisplayMode,
    cancel: &CancellationToken,
) -> Result<IpAddr, ExecutorError> {
    info!(guest = %guest, ?mode, "starting guest");
    cancellable(cancel, "start", hypervisor.start(guest, mode)).await?;

    info!(guest = %guest, "waiting for guest IP address");
    let address = cancellable(cancel, "guest address", hypervisor.guest_address(guest))
        .await?
        .ok_or_else(|| ExecutorError::NoGuestAddress {
            guest: guest.image_path.clone(),
        })?;

    info!(guest = %guest, %address, "guest reported address");
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Operation;
    use crate::fake::{Call, FakeHypervisor};

    #[tokio::test]
    async fn boot_starts_then_queries_address() {
        let hv = FakeHypervisor::new();
        let guest = GuestHandle::attach("/clones/c.vmx");
        let result = boot(&hv, &guest, DisplayMode::Gui, &CancellationToken::new()).await;
        assert_eq!(result.ok(), Some(IpAddr::from([192, 168, 64, 10])));
        assert_eq!(
            hv.calls(),
            vec![
                Call::Start(guest.image_path.clone(), DisplayMode::Gui),
                Call::Address(guest.image_path.clone()),
            ]
        );
    }

    #[tokio::test]
    async fn missing_address_fails_immediately() {
        let hv = FakeHypervisor::new().without_address();
        let guest = GuestHandle::attach("/clones/c.vmx");
        let result = boot(&hv, &guest, DisplayMode::Headless, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ExecutorError::NoGuestAddress { .. })), "got {result:?}");
        let queries = hv.calls().iter().filter(|c| matches!(c, Call::Address(_))).count();
        assert_eq!(queries, 1, "no retry loop at this layer");
    }

    #[tokio::test]
    async fn start_failure_skips_address_query() {
        let hv = FakeHypervisor::new().failing(Operation::Start);
        let guest = GuestHandle::attach("/clones/c.vmx");
        let result = boot(&hv, &guest, DisplayMode::Headless, &CancellationToken::new()).await;
        assert!(
            matches!(
                result,
                Err(ExecutorError::Provisioning {
                    operation: Operation::Start,
                    ..
                })
            ),
            "got {result:?}"
        );
        assert!(!hv.calls().iter().any(|c| matches!(c, Call::Address(_))));
    }
}
