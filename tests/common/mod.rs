//! Shared setup for the lifecycle integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use lifeline::domain::volunteer::NewVolunteer;
use lifeline::external::{InMemoryDirectory, MockBlobStore, MockGeocoder};
use lifeline::manager::{PageRequest, RequestFilter, RequestStats, VolunteerFilter};
use lifeline::{
    Account, AccountId, Actor, HelpRequest, InMemoryStorage, LifecycleCoordinator, LifelineError,
    ModerationDecision, Page, ProofMedia, ProofSubmission, RequestForm, RequestId, Result, Role,
    Storage, Volunteer, VolunteerId, VolunteerStatus,
};
use uuid::Uuid;

pub struct Harness<S: Storage> {
    pub coordinator: Arc<LifecycleCoordinator<S>>,
    pub storage: Arc<S>,
    pub directory: InMemoryDirectory,
    pub blobs: MockBlobStore,
    pub admin: Actor,
}

impl Harness<InMemoryStorage> {
    pub fn new() -> Self {
        Self::with_storage(InMemoryStorage::new())
    }
}

impl<S: Storage + 'static> Harness<S> {
    pub fn with_storage(storage: S) -> Self {
        let storage = Arc::new(storage);
        let directory = InMemoryDirectory::new();
        let blobs = MockBlobStore::new();
        let coordinator = Arc::new(LifecycleCoordinator::new(
            storage.clone(),
            Arc::new(blobs.clone()),
            Arc::new(MockGeocoder::new()),
            Arc::new(directory.clone()),
        ));
        let admin = register_account(&directory, Role::CoreAdmin, None);
        Self {
            coordinator,
            storage,
            directory,
            blobs,
            admin,
        }
    }

    pub fn account(&self, role: Role, district: &str) -> Actor {
        register_account(&self.directory, role, Some(district))
    }

    /// A pending request from a fresh help seeker in `district`.
    pub async fn submit(&self, urgency: &str, district: &str) -> (Actor, HelpRequest) {
        let seeker = self.account(Role::HelpSeeker, district);
        let request = self
            .coordinator
            .create_request(
                &seeker,
                RequestForm {
                    title: "Help with school fees".to_string(),
                    description: "Looking for a tutor and books for my daughter".to_string(),
                    category: "Education".to_string(),
                    urgency: urgency.to_string(),
                    location: format!("Central, {district}"),
                    ..Default::default()
                },
            )
            .await
            .expect("Failed to create request");
        (seeker, request)
    }

    /// A request approved and published by the core admin.
    pub async fn approved(&self, urgency: &str, district: &str) -> (Actor, HelpRequest) {
        let (seeker, request) = self.submit(urgency, district).await;
        let request = self
            .coordinator
            .moderate_content(&self.admin, request.id, ModerationDecision::Approve)
            .await
            .expect("Failed to approve request");
        (seeker, request)
    }

    /// A registered volunteer approved by the core admin.
    pub async fn volunteer(&self, district: &str) -> (Actor, Volunteer) {
        let actor = self.account(Role::Volunteer, district);
        let volunteer = self
            .coordinator
            .register_volunteer(
                &actor,
                NewVolunteer {
                    location: district.to_string(),
                    skills: vec!["tutoring".to_string()],
                    causes: vec!["education".to_string()],
                    availability: "flexible".to_string(),
                    motivation: "Giving back to my community".to_string(),
                    ..Default::default()
                },
                None,
            )
            .await
            .expect("Failed to register volunteer");
        let volunteer = self
            .coordinator
            .review_volunteer(&self.admin, volunteer.id, VolunteerStatus::Approved)
            .await
            .expect("Failed to approve volunteer");
        (actor, volunteer)
    }

    pub async fn volunteer_state(&self, id: VolunteerId) -> Volunteer {
        self.storage
            .get_volunteer(id)
            .await
            .expect("Volunteer not found")
    }

    pub async fn request_state(&self, id: RequestId) -> HelpRequest {
        self.storage.get_request(id).await.expect("Request not found")
    }
}

pub fn proof() -> ProofSubmission {
    ProofSubmission {
        notes: Some("Delivered the books".to_string()),
        media: Some(ProofMedia::Url(
            "https://images.example.com/receipt.jpg".to_string(),
        )),
    }
}

fn register_account(directory: &InMemoryDirectory, role: Role, district: Option<&str>) -> Actor {
    let id = AccountId(Uuid::new_v4());
    let account = Account {
        id,
        name: format!("{role} {id}"),
        email: format!("{}@example.com", id.0),
        phone: "+91 90000 12345".to_string(),
        role,
        district: district.map(str::to_string),
        is_active: true,
    };
    directory.insert(account.clone());
    account.actor()
}

/// Storage whose volunteer writes can be made to fail, to exercise partial
/// application.
#[derive(Clone, Default)]
pub struct FlakyStorage {
    inner: InMemoryStorage,
    fail_volunteer_writes: Arc<AtomicBool>,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_volunteer_writes.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn insert_request(&self, request: HelpRequest) -> Result<()> {
        self.inner.insert_request(request).await
    }

    async fn get_request(&self, id: RequestId) -> Result<HelpRequest> {
        self.inner.get_request(id).await
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<Page<HelpRequest>> {
        self.inner.list_requests(filter, page).await
    }

    async fn modify_request<T, F>(&self, id: RequestId, f: F) -> Result<(HelpRequest, T)>
    where
        F: FnOnce(&mut HelpRequest) -> Result<T> + Send,
        T: Send,
    {
        self.inner.modify_request(id, f).await
    }

    async fn remove_request<F>(&self, id: RequestId, guard: F) -> Result<HelpRequest>
    where
        F: FnOnce(&HelpRequest) -> Result<()> + Send,
    {
        self.inner.remove_request(id, guard).await
    }

    async fn request_stats(&self) -> Result<RequestStats> {
        self.inner.request_stats().await
    }

    async fn insert_volunteer(&self, volunteer: Volunteer) -> Result<()> {
        self.inner.insert_volunteer(volunteer).await
    }

    async fn get_volunteer(&self, id: VolunteerId) -> Result<Volunteer> {
        self.inner.get_volunteer(id).await
    }

    async fn find_volunteer_by_account(&self, account: AccountId) -> Result<Option<Volunteer>> {
        self.inner.find_volunteer_by_account(account).await
    }

    async fn list_volunteers(&self, filter: &VolunteerFilter) -> Result<Vec<Volunteer>> {
        self.inner.list_volunteers(filter).await
    }

    async fn modify_volunteer<T, F>(&self, id: VolunteerId, f: F) -> Result<(Volunteer, T)>
    where
        F: FnOnce(&mut Volunteer) -> Result<T> + Send,
        T: Send,
    {
        if self.fail_volunteer_writes.load(Ordering::SeqCst) {
            return Err(LifelineError::Other(anyhow::anyhow!(
                "injected volunteer write failure"
            )));
        }
        self.inner.modify_volunteer(id, f).await
    }

    async fn top_volunteers(&self, limit: usize) -> Result<Vec<Volunteer>> {
        self.inner.top_volunteers(limit).await
    }
}

struct Gate {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Storage that can hold the next volunteer write until the test lets it go,
/// to interleave another operation between a request write and its ledger
/// write.
#[derive(Clone, Default)]
pub struct GatedStorage {
    inner: InMemoryStorage,
    gate: Arc<Mutex<Option<Gate>>>,
}

impl GatedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause the next `modify_volunteer`. The first receiver fires once it is
    /// waiting; sending on the returned sender lets it continue.
    pub fn pause_next_volunteer_write(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.gate.lock() = Some(Gate {
            reached: reached_tx,
            release: release_rx,
        });
        (reached_rx, release_tx)
    }
}

#[async_trait]
impl Storage for GatedStorage {
    async fn insert_request(&self, request: HelpRequest) -> Result<()> {
        self.inner.insert_request(request).await
    }

    async fn get_request(&self, id: RequestId) -> Result<HelpRequest> {
        self.inner.get_request(id).await
    }

    async fn list_requests(
        &self,
        filter: &RequestFilter,
        page: PageRequest,
    ) -> Result<Page<HelpRequest>> {
        self.inner.list_requests(filter, page).await
    }

    async fn modify_request<T, F>(&self, id: RequestId, f: F) -> Result<(HelpRequest, T)>
    where
        F: FnOnce(&mut HelpRequest) -> Result<T> + Send,
        T: Send,
    {
        self.inner.modify_request(id, f).await
    }

    async fn remove_request<F>(&self, id: RequestId, guard: F) -> Result<HelpRequest>
    where
        F: FnOnce(&HelpRequest) -> Result<()> + Send,
    {
        self.inner.remove_request(id, guard).await
    }

    async fn request_stats(&self) -> Result<RequestStats> {
        self.inner.request_stats().await
    }

    async fn insert_volunteer(&self, volunteer: Volunteer) -> Result<()> {
        self.inner.insert_volunteer(volunteer).await
    }

    async fn get_volunteer(&self, id: VolunteerId) -> Result<Volunteer> {
        self.inner.get_volunteer(id).await
    }

    async fn find_volunteer_by_account(&self, account: AccountId) -> Result<Option<Volunteer>> {
        self.inner.find_volunteer_by_account(account).await
    }

    async fn list_volunteers(&self, filter: &VolunteerFilter) -> Result<Vec<Volunteer>> {
        self.inner.list_volunteers(filter).await
    }

    async fn modify_volunteer<T, F>(&self, id: VolunteerId, f: F) -> Result<(Volunteer, T)>
    where
        F: FnOnce(&mut Volunteer) -> Result<T> + Send,
        T: Send,
    {
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.reached.send(());
            let _ = gate.release.await;
        }
        self.inner.modify_volunteer(id, f).await
    }

    async fn top_volunteers(&self, limit: usize) -> Result<Vec<Volunteer>> {
        self.inner.top_volunteers(limit).await
    }
}
