//! Control plane service implementation.
//!
//! This module provides the `ControlPlane` trait and `ControlPlaneService`,
//! which ties the inventory, the orchestration engine, boot tokens and
//! accounts together behind one API. Every operation that acts on behalf of
//! a user takes the caller's [`AuthContext`].

use std::sync::Arc;

use async_trait::async_trait;
use grendel_auth::{AuthConfig, BootTokenSigner, HmacValidator};
use grendel_bmc::BmcConnector;
use grendel_store::{BootImage, DataDump, Event, Node, Permission, Role, Store};
use parking_lot::Mutex;
use tokio::sync::RwLock;

use crate::accounts;
use crate::boot;
use crate::engine::Engine;
use crate::error::{ControlError, Result};
use crate::events;
use crate::inventory;
use crate::types::{
    AuthContext, BatchReport, BootTokenResult, EngineConfig, MutationResult, NodeSelector,
    Operation, TagAction, TokenResponse, UpsertReport, UserView,
};

/// Trait defining the control plane operations.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    // =========================================================================
    // Accounts
    // =========================================================================

    /// Sign in with a password.
    async fn signin(&self, username: &str, password: &str) -> Result<TokenResponse>;

    /// Create an account and sign in.
    async fn signup(&self, username: &str, password: &str) -> Result<TokenResponse>;

    /// Check that the caller may perform `method` on `path`.
    ///
    /// Returns the caller with its current role.
    async fn authorize(&self, ctx: &AuthContext, method: &str, path: &str) -> Result<AuthContext>;

    /// Change a password.
    async fn reset_password(
        &self,
        ctx: &AuthContext,
        username: &str,
        password: &str,
    ) -> Result<MutationResult>;

    /// Issue an API token.
    async fn issue_api_token(
        &self,
        ctx: &AuthContext,
        username: &str,
        role: &str,
        expire: &str,
    ) -> Result<TokenResponse>;

    /// List roles.
    async fn list_roles(&self, ctx: &AuthContext) -> Result<Vec<Role>>;

    /// Create a role.
    async fn add_role(
        &self,
        ctx: &AuthContext,
        name: &str,
        inherited: Option<&str>,
    ) -> Result<MutationResult>;

    /// Replace a role's permissions.
    async fn edit_role(
        &self,
        ctx: &AuthContext,
        name: &str,
        permissions: Vec<Permission>,
    ) -> Result<MutationResult>;

    /// Delete roles.
    async fn delete_roles(&self, ctx: &AuthContext, names: &[String]) -> Result<MutationResult>;

    /// List users.
    async fn list_users(&self, ctx: &AuthContext) -> Result<Vec<UserView>>;

    /// Assign a role to users.
    async fn set_user_role(
        &self,
        ctx: &AuthContext,
        names: &[String],
        role: &str,
    ) -> Result<MutationResult>;

    /// Delete users.
    async fn delete_users(&self, ctx: &AuthContext, names: &[String]) -> Result<MutationResult>;

    // =========================================================================
    // Inventory
    // =========================================================================

    /// Every node.
    async fn list_nodes(&self, ctx: &AuthContext) -> Result<Vec<Node>>;

    /// Nodes matching a selector.
    async fn find_nodes(&self, ctx: &AuthContext, selector: &NodeSelector) -> Result<Vec<Node>>;

    /// Insert or replace nodes.
    async fn upsert_nodes(&self, ctx: &AuthContext, nodes: Vec<Node>) -> Result<UpsertReport>;

    /// Delete nodes.
    async fn delete_nodes(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
    ) -> Result<MutationResult>;

    /// Assign a boot image.
    async fn set_boot_image(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        image: &str,
    ) -> Result<MutationResult>;

    /// Set the provision flag.
    async fn set_provision(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        provision: bool,
    ) -> Result<MutationResult>;

    /// Add or remove tags.
    async fn apply_tags(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        action: TagAction,
        tags: &[String],
    ) -> Result<MutationResult>;

    /// Every boot image.
    async fn list_images(&self, ctx: &AuthContext) -> Result<Vec<BootImage>>;

    /// The named boot images.
    async fn find_images(&self, ctx: &AuthContext, names: &[String]) -> Result<Vec<BootImage>>;

    /// Insert or merge boot images.
    async fn upsert_images(
        &self,
        ctx: &AuthContext,
        images: Vec<BootImage>,
    ) -> Result<UpsertReport>;

    /// Delete boot images.
    async fn delete_images(&self, ctx: &AuthContext, names: &[String]) -> Result<MutationResult>;

    // =========================================================================
    // Provisioning
    // =========================================================================

    /// Issue boot tokens for an interface of every matching node.
    async fn issue_boot_tokens(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        interface: &str,
    ) -> Result<Vec<BootTokenResult>>;

    /// Consume a boot token and render the node's iPXE script.
    async fn ipxe_script(&self, token: &str) -> Result<String>;

    /// Run a BMC operation on every matching node.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::EmptyNodeSet` if nothing matches. Per-node
    /// failures are reported inside the [`BatchReport`].
    async fn execute(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        operation: Operation,
    ) -> Result<BatchReport>;

    // =========================================================================
    // Operational
    // =========================================================================

    /// The newest events first.
    async fn list_events(&self, ctx: &AuthContext, limit: usize) -> Result<Vec<Event>>;

    /// Export hosts, images and users.
    async fn dump(&self, ctx: &AuthContext) -> Result<DataDump>;

    /// Merge the dump's hosts, images and users into the store.
    async fn restore(&self, ctx: &AuthContext, dump: DataDump) -> Result<MutationResult>;
}

/// The main control plane service implementation.
pub struct ControlPlaneService<S: Store, B: BmcConnector> {
    store: Arc<S>,
    engine: Engine<B>,
    sessions: Arc<HmacValidator>,
    boot_tokens: BootTokenSigner,
    boot_base_url: Option<String>,
    /// Node resolution holds this shared; inventory writes hold it exclusively.
    inventory: RwLock<()>,
    /// Serializes writes to user records.
    accounts: Mutex<()>,
}

impl<S, B> ControlPlaneService<S, B>
where
    S: Store + 'static,
    B: BmcConnector + 'static,
{
    /// Create a new control plane service.
    ///
    /// `sessions` is shared with the gateway, which validates and revokes
    /// the tokens issued here.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        connector: Arc<B>,
        sessions: Arc<HmacValidator>,
        auth: &AuthConfig,
        engine: EngineConfig,
    ) -> Self {
        Self {
            store,
            engine: Engine::new(connector, engine),
            sessions,
            boot_tokens: BootTokenSigner::new(auth),
            boot_base_url: None,
            inventory: RwLock::new(()),
            accounts: Mutex::new(()),
        }
    }

    /// Prefix relative boot asset paths with `url`.
    #[must_use]
    pub fn with_boot_base_url(mut self, url: impl Into<String>) -> Self {
        self.boot_base_url = Some(url.into());
        self
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the engine.
    #[must_use]
    pub const fn engine(&self) -> &Engine<B> {
        &self.engine
    }
}

#[async_trait]
impl<S, B> ControlPlane for ControlPlaneService<S, B>
where
    S: Store + 'static,
    B: BmcConnector + 'static,
{
    // =========================================================================
    // Accounts
    // =========================================================================

    async fn signin(&self, username: &str, password: &str) -> Result<TokenResponse> {
        accounts::signin(&*self.store, &self.sessions, username, password)
    }

    async fn signup(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let _accounts = self.accounts.lock();
        accounts::signup(&*self.store, &self.sessions, username, password)
    }

    async fn authorize(&self, ctx: &AuthContext, method: &str, path: &str) -> Result<AuthContext> {
        accounts::authorize(&*self.store, ctx, method, path)
    }

    async fn reset_password(
        &self,
        ctx: &AuthContext,
        username: &str,
        password: &str,
    ) -> Result<MutationResult> {
        accounts::reset_password(&*self.store, ctx, username, password)
    }

    async fn issue_api_token(
        &self,
        ctx: &AuthContext,
        username: &str,
        role: &str,
        expire: &str,
    ) -> Result<TokenResponse> {
        accounts::issue_api_token(&*self.store, &self.sessions, ctx, username, role, expire)
    }

    async fn list_roles(&self, _ctx: &AuthContext) -> Result<Vec<Role>> {
        accounts::list_roles(&*self.store)
    }

    async fn add_role(
        &self,
        ctx: &AuthContext,
        name: &str,
        inherited: Option<&str>,
    ) -> Result<MutationResult> {
        accounts::add_role(&*self.store, ctx, name, inherited)
    }

    async fn edit_role(
        &self,
        ctx: &AuthContext,
        name: &str,
        permissions: Vec<Permission>,
    ) -> Result<MutationResult> {
        accounts::edit_role(&*self.store, ctx, name, permissions)
    }

    async fn delete_roles(&self, ctx: &AuthContext, names: &[String]) -> Result<MutationResult> {
        accounts::delete_roles(&*self.store, ctx, names)
    }

    async fn list_users(&self, _ctx: &AuthContext) -> Result<Vec<UserView>> {
        accounts::list_users(&*self.store)
    }

    async fn set_user_role(
        &self,
        ctx: &AuthContext,
        names: &[String],
        role: &str,
    ) -> Result<MutationResult> {
        let _accounts = self.accounts.lock();
        accounts::set_user_role(&*self.store, ctx, names, role)
    }

    async fn delete_users(&self, ctx: &AuthContext, names: &[String]) -> Result<MutationResult> {
        let _accounts = self.accounts.lock();
        accounts::delete_users(&*self.store, ctx, names)
    }

    // =========================================================================
    // Inventory
    // =========================================================================

    async fn list_nodes(&self, _ctx: &AuthContext) -> Result<Vec<Node>> {
        let _gate = self.inventory.read().await;
        Ok(self.store.list_nodes()?)
    }

    async fn find_nodes(&self, _ctx: &AuthContext, selector: &NodeSelector) -> Result<Vec<Node>> {
        let _gate = self.inventory.read().await;
        inventory::find_nodes(&*self.store, selector)
    }

    async fn upsert_nodes(&self, ctx: &AuthContext, nodes: Vec<Node>) -> Result<UpsertReport> {
        let _gate = self.inventory.write().await;
        inventory::upsert_nodes(&*self.store, ctx, nodes)
    }

    async fn delete_nodes(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
    ) -> Result<MutationResult> {
        let _gate = self.inventory.write().await;
        inventory::delete_nodes(&*self.store, ctx, selector)
    }

    async fn set_boot_image(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        image: &str,
    ) -> Result<MutationResult> {
        let _gate = self.inventory.write().await;
        inventory::set_boot_image(&*self.store, ctx, selector, image)
    }

    async fn set_provision(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        provision: bool,
    ) -> Result<MutationResult> {
        let _gate = self.inventory.write().await;
        inventory::set_provision(&*self.store, ctx, selector, provision)
    }

    async fn apply_tags(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        action: TagAction,
        tags: &[String],
    ) -> Result<MutationResult> {
        let _gate = self.inventory.write().await;
        inventory::apply_tags(&*self.store, ctx, selector, action, tags)
    }

    async fn list_images(&self, _ctx: &AuthContext) -> Result<Vec<BootImage>> {
        Ok(self.store.list_images()?)
    }

    async fn find_images(&self, _ctx: &AuthContext, names: &[String]) -> Result<Vec<BootImage>> {
        inventory::find_images(&*self.store, names)
    }

    async fn upsert_images(
        &self,
        ctx: &AuthContext,
        images: Vec<BootImage>,
    ) -> Result<UpsertReport> {
        let _gate = self.inventory.write().await;
        inventory::upsert_images(&*self.store, ctx, images)
    }

    async fn delete_images(&self, ctx: &AuthContext, names: &[String]) -> Result<MutationResult> {
        let _gate = self.inventory.write().await;
        inventory::delete_images(&*self.store, ctx, names)
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    async fn issue_boot_tokens(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        interface: &str,
    ) -> Result<Vec<BootTokenResult>> {
        let _gate = self.inventory.read().await;
        let results = boot::issue_tokens(&*self.store, &self.boot_tokens, selector, interface)?;
        tracing::debug!(user = %ctx.username, nodes = results.len(), "Boot tokens requested");
        Ok(results)
    }

    async fn ipxe_script(&self, token: &str) -> Result<String> {
        let _gate = self.inventory.read().await;
        boot::ipxe_script(
            &*self.store,
            &self.boot_tokens,
            token,
            self.boot_base_url.as_deref(),
        )
    }

    async fn execute(
        &self,
        ctx: &AuthContext,
        selector: &NodeSelector,
        operation: Operation,
    ) -> Result<BatchReport> {
        let nodes = {
            let _gate = self.inventory.read().await;
            let nodes = inventory::find_nodes(&*self.store, selector)?;
            if nodes.is_empty() {
                return Err(ControlError::EmptyNodeSet);
            }
            nodes
        };

        tracing::info!(
            user = %ctx.username,
            operation = operation.name(),
            nodes = nodes.len(),
            "Dispatching BMC operation"
        );
        let mutating = operation.is_mutating();
        let mut report = self.engine.run(nodes, operation).await?;

        if mutating {
            report.event_id = events::record(
                &*self.store,
                ctx,
                report.severity(),
                report.summary(),
                report.job_messages(),
            );
        }
        Ok(report)
    }

    // =========================================================================
    // Operational
    // =========================================================================

    async fn list_events(&self, _ctx: &AuthContext, limit: usize) -> Result<Vec<Event>> {
        Ok(self.store.list_events(limit)?)
    }

    async fn dump(&self, ctx: &AuthContext) -> Result<DataDump> {
        let _gate = self.inventory.read().await;
        let dump = self.store.dump()?;
        tracing::info!(
            user = %ctx.username,
            hosts = dump.hosts.len(),
            images = dump.images.len(),
            users = dump.users.len(),
            "Exported database"
        );
        Ok(dump)
    }

    async fn restore(&self, ctx: &AuthContext, dump: DataDump) -> Result<MutationResult> {
        let _gate = self.inventory.write().await;
        inventory::restore(&*self.store, ctx, &dump)
    }
}
