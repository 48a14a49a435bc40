//! Shared application state and the store backends behind it.

use std::sync::Arc;

use domain::{
    AvailabilityLedger, AvailabilityRepository, BookingRepository, BookingService,
    InMemoryAvailabilityStore, InMemoryBookingStore, PostgresAvailabilityStore,
    PostgresBookingStore, StoreError,
};
use event_bus::Outbox;
use notifications::{
    InMemoryNotificationStore, NotificationRepository, NotificationService,
    PostgresNotificationStore,
};
use reservation::ReservationCoordinator;
use sqlx::PgPool;

/// A family of stores the server can run on.
///
/// The booking store doubles as the outbox the relay drains, so it must be
/// cheap to clone.
pub trait Backend: Send + Sync + 'static {
    type Bookings: BookingRepository + Outbox + Clone + 'static;
    type Slots: AvailabilityRepository + 'static;
    type Notifications: NotificationRepository + 'static;
}

/// Process-local stores; state is lost on restart.
pub struct InMemoryBackend;

impl Backend for InMemoryBackend {
    type Bookings = InMemoryBookingStore;
    type Slots = InMemoryAvailabilityStore;
    type Notifications = InMemoryNotificationStore;
}

/// PostgreSQL stores sharing one connection pool.
pub struct PostgresBackend;

impl Backend for PostgresBackend {
    type Bookings = PostgresBookingStore;
    type Slots = PostgresAvailabilityStore;
    type Notifications = PostgresNotificationStore;
}

/// Shared application state accessible from all handlers.
pub struct AppState<B: Backend> {
    pub bookings: Arc<BookingService<B::Bookings>>,
    pub ledger: Arc<AvailabilityLedger<B::Slots>>,
    pub reservations: ReservationCoordinator<B::Bookings, B::Slots>,
    pub notifications: Arc<NotificationService<B::Notifications>>,
    /// Pool probed by the readiness check; `None` for in-memory stores.
    pub pool: Option<PgPool>,
}

impl<B: Backend> AppState<B> {
    pub fn new(
        bookings: B::Bookings,
        slots: B::Slots,
        notifications: B::Notifications,
        pool: Option<PgPool>,
    ) -> Self {
        let bookings = Arc::new(BookingService::new(bookings));
        let ledger = Arc::new(AvailabilityLedger::new(slots));
        Self {
            reservations: ReservationCoordinator::new(bookings.clone(), ledger.clone()),
            bookings,
            ledger,
            notifications: Arc::new(NotificationService::new(notifications)),
            pool,
        }
    }

    /// The booking store, for the outbox relay.
    pub fn outbox(&self) -> B::Bookings {
        self.bookings.repository().clone()
    }
}

/// Creates application state over fresh in-memory stores.
pub fn in_memory_state() -> Arc<AppState<InMemoryBackend>> {
    Arc::new(AppState::new(
        InMemoryBookingStore::new(),
        InMemoryAvailabilityStore::new(),
        InMemoryNotificationStore::new(),
        None,
    ))
}

/// Runs the migrations and creates application state over PostgreSQL.
pub async fn postgres_state(pool: PgPool) -> Result<Arc<AppState<PostgresBackend>>, StoreError> {
    let bookings = PostgresBookingStore::new(pool.clone());
    bookings.run_migrations().await?;

    Ok(Arc::new(AppState::new(
        bookings,
        PostgresAvailabilityStore::new(pool.clone()),
        PostgresNotificationStore::new(pool.clone()),
        Some(pool),
    )))
}
