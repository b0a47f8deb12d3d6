use dashmap::DashMap;

use crate::payment::LocalPayment;

/// Storage for local payments, owned by the host.
///
/// `save` persists the whole payment, details included, as one value.
/// Handlers that await the provider between reading and writing use
/// `compare_and_save`, which must be atomic with respect to other writers.
pub trait PaymentRepository: Send + Sync {
    fn find(&self, id: i64) -> Option<LocalPayment>;
    fn save(&self, payment: LocalPayment);

    /// Store `payment` only if the stored value still equals `expected`.
    /// Returns `false` when it changed or is gone.
    fn compare_and_save(&self, expected: &LocalPayment, payment: LocalPayment) -> bool;
}

/// In-process repository for single-node hosts and tests.
#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: DashMap<i64, LocalPayment>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }
}

impl PaymentRepository for InMemoryPaymentRepository {
    fn find(&self, id: i64) -> Option<LocalPayment> {
        self.payments.get(&id).map(|entry| entry.value().clone())
    }

    fn save(&self, payment: LocalPayment) {
        self.payments.insert(payment.id, payment);
    }

    fn compare_and_save(&self, expected: &LocalPayment, payment: LocalPayment) -> bool {
        match self.payments.get_mut(&payment.id) {
            Some(mut current) if *current == *expected => {
                *current = payment;
                true
            }
            _ => false,
        }
    }
}
