//! Order saga demo showing happy and unhappy paths.
//!
//! Run with: cargo run --example order_saga
//! Set `RUST_LOG=saga_coordinator=debug` to see step and retry events.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use saga_coordinator::{
    Classify, ContextError, ExecutionContext, RetryFilter, RetryPolicy, Saga, SagaError, Step,
};
use thiserror::Error;

// ============================================================================
// Context and Error types
// ============================================================================

#[derive(Debug, Clone, Default)]
struct OrderState {
    order_id: Option<String>,
    inventory_reserved: bool,
    payment_id: Option<String>,
    notification_sent: bool,
}

type Shared = Arc<Mutex<OrderState>>;

#[derive(Debug, Clone, Error)]
enum OrderError {
    #[error("payment gateway timeout")]
    GatewayTimeout,
    #[error("card declined")]
    CardDeclined,
    #[error("inventory unavailable")]
    InventoryUnavailable,
    #[error("notification service down")]
    NotificationFailed,
    #[error(transparent)]
    Interrupted(#[from] ContextError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OrderErrorKind {
    Transient,
    Permanent,
}

impl Classify for OrderError {
    type Kind = OrderErrorKind;

    fn kind(&self) -> OrderErrorKind {
        match self {
            Self::GatewayTimeout | Self::NotificationFailed => OrderErrorKind::Transient,
            _ => OrderErrorKind::Permanent,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scenario {
    quantity: u32,
    payment_failures: u32,
    card_declined: bool,
    notification_down: bool,
}

// ============================================================================
// Saga definition
// ============================================================================

fn order_saga(state: &Shared, scenario: Scenario) -> Saga<OrderError> {
    let payment_attempts = Arc::new(AtomicU32::new(0));
    let payment_policy = RetryPolicy::builder()
        .max_attempts(3)
        .initial_interval(Duration::from_millis(100))
        .max_interval(Duration::from_secs(1))
        .multiplier(2.0)
        .jitter(0.2)
        .build()
        .unwrap_or_default();

    let mut saga = Saga::new();

    let s = state.clone();
    let undo = state.clone();
    saga.compensable_step(
        "create_order",
        move |_ctx: ExecutionContext| {
            let s = s.clone();
            async move {
                s.lock().order_id = Some("ORD-001".to_string());
                println!("  [create_order] order created");
                Ok(())
            }
        },
        move |_ctx: ExecutionContext| {
            let s = undo.clone();
            async move {
                println!("  [create_order] COMPENSATING - cancelling order");
                s.lock().order_id = None;
                Ok(())
            }
        },
    );

    let s = state.clone();
    let undo = state.clone();
    saga.compensable_step(
        "reserve_inventory",
        move |_ctx: ExecutionContext| {
            let s = s.clone();
            async move {
                if scenario.quantity > 100 {
                    println!("  [reserve_inventory] FAILED - not enough stock");
                    return Err(OrderError::InventoryUnavailable);
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                s.lock().inventory_reserved = true;
                println!("  [reserve_inventory] reserved {} items", scenario.quantity);
                Ok(())
            }
        },
        move |_ctx: ExecutionContext| {
            let s = undo.clone();
            async move {
                println!("  [reserve_inventory] COMPENSATING - releasing items");
                s.lock().inventory_reserved = false;
                Ok(())
            }
        },
    );

    let s = state.clone();
    let undo = state.clone();
    let attempts = payment_attempts.clone();
    saga.retryable_step_filtered(
        Step::new("process_payment", move |_ctx: ExecutionContext| {
            let s = s.clone();
            let attempts = attempts.clone();
            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                println!("  [process_payment] attempt {attempt}");
                if attempt <= scenario.payment_failures {
                    println!("  [process_payment] TRANSIENT FAILURE - will retry");
                    return Err(OrderError::GatewayTimeout);
                }
                if scenario.card_declined {
                    println!("  [process_payment] PERMANENT FAILURE - card declined");
                    return Err(OrderError::CardDeclined);
                }
                s.lock().payment_id = Some(format!("PAY-{attempt}"));
                Ok(())
            }
        })
        .with_compensation(move |_ctx: ExecutionContext| {
            let s = undo.clone();
            async move {
                println!("  [process_payment] COMPENSATING - refunding");
                s.lock().payment_id = None;
                Ok(())
            }
        }),
        payment_policy,
        RetryFilter::kinds([OrderErrorKind::Transient]),
    );

    let s = state.clone();
    saga.step("send_notification", move |_ctx: ExecutionContext| {
        let s = s.clone();
        async move {
            if scenario.notification_down {
                return Err(OrderError::NotificationFailed);
            }
            s.lock().notification_sent = true;
            println!("  [send_notification] email sent");
            Ok(())
        }
    });

    saga.on_success(|_ctx: ExecutionContext| async {
        println!("  [on_success] order finalized");
        Ok(())
    })
    .on_failure(|_ctx: ExecutionContext, cause: OrderError| async move {
        println!("  [on_failure] notifying support: {cause}");
        Ok(())
    });

    saga
}

// ============================================================================
// Demo scenarios
// ============================================================================

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let scenarios = [
        (
            "Happy path - all steps succeed",
            Scenario {
                quantity: 5,
                payment_failures: 0,
                card_declined: false,
                notification_down: false,
            },
        ),
        (
            "Inventory failure - compensates the order",
            Scenario {
                quantity: 999,
                payment_failures: 0,
                card_declined: false,
                notification_down: false,
            },
        ),
        (
            "Payment retry - transient failures, then success",
            Scenario {
                quantity: 3,
                payment_failures: 2,
                card_declined: false,
                notification_down: false,
            },
        ),
        (
            "Card declined - not retried, full compensation",
            Scenario {
                quantity: 10,
                payment_failures: 0,
                card_declined: true,
                notification_down: false,
            },
        ),
        (
            "Notification down - no handler, earlier steps compensated",
            Scenario {
                quantity: 1,
                payment_failures: 0,
                card_declined: false,
                notification_down: true,
            },
        ),
    ];

    for (i, (title, scenario)) in scenarios.into_iter().enumerate() {
        println!("\nScenario {}: {title}\n", i + 1);

        let state = Shared::default();
        let mut saga = order_saga(&state, scenario);
        let ctx = ExecutionContext::new().with_timeout(Duration::from_secs(5));

        match saga.execute(&ctx).await {
            Ok(()) => {
                println!("\n  ok: order completed");
                println!("    final state: {:?}", state.lock());
            }
            Err(err) => report(&err, &state),
        }
    }
}

fn report(err: &SagaError<OrderError>, state: &Shared) {
    println!("\n  failed: {err}");
    for (step, cause) in err.compensation().failures() {
        println!("    compensation of {step} failed: {cause}");
    }
    println!("    state after rollback: {:?}", state.lock());
}
