//! Reader facade
//!
//! [`GameReader`] ties the pieces together: it keeps an [`Attacher`] pointed at
//! the live game, resolves the root pointer by signature on every
//! [`refresh`](GameReader::refresh), and hands out [`Entity`] views for the
//! player and the configured boss.
//!
//! Typical use from a step loop:
//!
//! ```ignore
//! let mut reader = GameReader::new(GameLayout::builtin(), ReaderConfig::default())?;
//! reader.attach()?;
//! reader.refresh()?;
//! loop {
//!     reader.refresh_if_stale()?;
//!     let hp = reader.boss()?.normalized(ResourceKind::Health)?;
//! }
//! ```

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::attach;
use crate::entity::{
    CollisionPolicy, Discriminator, Entity, EntityCatalog, EntityRecord, MaxHpDiscriminator,
};
use crate::error::{Error, Result};
use crate::memory::layout::bosses;
use crate::memory::{ProcessProvider, SystemProcesses};
use crate::offset::{GameLayout, resolve_signature};
use crate::session::{AttachConfig, AttachState, Attacher, ProcessSession, Relauncher};

/// Configuration for [`GameReader`]
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Boss identifier, looked up in the layout's boss table
    pub boss: String,
    pub collision_policy: CollisionPolicy,
    /// Overrides the layout's process name
    pub process_name: Option<String>,
    /// Overrides the layout's module name
    pub module_name: Option<String>,
    pub attach_timeout: Duration,
    pub poll_interval: Duration,
    pub relaunch_after: Duration,
    pub relaunch_timeout: Duration,
    pub relaunch_cooldown: Duration,
    pub allow_relaunch: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            boss: bosses::IUDEX_GUNDYR.0.to_string(),
            collision_policy: CollisionPolicy::default(),
            process_name: None,
            module_name: None,
            attach_timeout: attach::DEFAULT_TIMEOUT,
            poll_interval: attach::POLL_INTERVAL,
            relaunch_after: attach::RELAUNCH_AFTER,
            relaunch_timeout: attach::RELAUNCH_TIMEOUT,
            relaunch_cooldown: attach::RELAUNCH_COOLDOWN,
            allow_relaunch: false,
        }
    }
}

impl ReaderConfig {
    /// Create a new configuration builder
    pub fn builder() -> ReaderConfigBuilder {
        ReaderConfigBuilder::default()
    }

    fn attach_config(&self, layout: &GameLayout) -> AttachConfig {
        AttachConfig {
            timeout: self.attach_timeout,
            poll_interval: self.poll_interval,
            relaunch_after: self.relaunch_after,
            relaunch_timeout: self.relaunch_timeout,
            relaunch_cooldown: self.relaunch_cooldown,
            allow_relaunch: self.allow_relaunch,
            ..AttachConfig::new(
                self.process_name.as_deref().unwrap_or(&layout.process_name),
                self.module_name.as_deref().unwrap_or(&layout.module_name),
            )
        }
    }
}

/// Builder for ReaderConfig
#[derive(Debug, Clone, Default)]
pub struct ReaderConfigBuilder {
    boss: Option<String>,
    collision_policy: Option<CollisionPolicy>,
    process_name: Option<String>,
    module_name: Option<String>,
    attach_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
    relaunch_after: Option<Duration>,
    relaunch_timeout: Option<Duration>,
    relaunch_cooldown: Option<Duration>,
    allow_relaunch: Option<bool>,
}

impl ReaderConfigBuilder {
    pub fn boss(mut self, name: &str) -> Self {
        self.boss = Some(name.to_string());
        self
    }

    pub fn collision_policy(mut self, policy: CollisionPolicy) -> Self {
        self.collision_policy = Some(policy);
        self
    }

    pub fn process_name(mut self, name: &str) -> Self {
        self.process_name = Some(name.to_string());
        self
    }

    pub fn module_name(mut self, name: &str) -> Self {
        self.module_name = Some(name.to_string());
        self
    }

    pub fn attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = Some(timeout);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// How long to wait for the process before relaunching it
    pub fn relaunch_after(mut self, delay: Duration) -> Self {
        self.relaunch_after = Some(delay);
        self
    }

    pub fn relaunch_timeout(mut self, timeout: Duration) -> Self {
        self.relaunch_timeout = Some(timeout);
        self
    }

    pub fn relaunch_cooldown(mut self, cooldown: Duration) -> Self {
        self.relaunch_cooldown = Some(cooldown);
        self
    }

    pub fn allow_relaunch(mut self, enabled: bool) -> Self {
        self.allow_relaunch = Some(enabled);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ReaderConfig {
        let default = ReaderConfig::default();
        ReaderConfig {
            boss: self.boss.unwrap_or(default.boss),
            collision_policy: self.collision_policy.unwrap_or(default.collision_policy),
            process_name: self.process_name.or(default.process_name),
            module_name: self.module_name.or(default.module_name),
            attach_timeout: self.attach_timeout.unwrap_or(default.attach_timeout),
            poll_interval: self.poll_interval.unwrap_or(default.poll_interval),
            relaunch_after: self.relaunch_after.unwrap_or(default.relaunch_after),
            relaunch_timeout: self.relaunch_timeout.unwrap_or(default.relaunch_timeout),
            relaunch_cooldown: self.relaunch_cooldown.unwrap_or(default.relaunch_cooldown),
            allow_relaunch: self.allow_relaunch.unwrap_or(default.allow_relaunch),
        }
    }
}

/// Everything resolved by one refresh. Dropped on reattach.
#[derive(Debug, Clone)]
struct Snapshot {
    root: u64,
    player: EntityRecord,
    boss: Option<EntityRecord>,
}

/// Live player and boss state read from the game process.
pub struct GameReader<P: ProcessProvider = SystemProcesses> {
    layout: GameLayout,
    config: ReaderConfig,
    attacher: Attacher<P>,
    catalog: EntityCatalog,
    discriminator: Box<dyn Discriminator>,
    snapshot: Option<Snapshot>,
}

impl GameReader<SystemProcesses> {
    pub fn new(layout: GameLayout, config: ReaderConfig) -> Result<Self> {
        Self::with_provider(SystemProcesses, layout, config)
    }
}

impl<P: ProcessProvider> GameReader<P> {
    /// Fails with [`Error::UnknownBoss`] when the configured boss is not in
    /// the layout's boss table.
    pub fn with_provider(provider: P, layout: GameLayout, config: ReaderConfig) -> Result<Self> {
        layout.validate()?;
        let max_hp = layout
            .bosses
            .max_hp(&config.boss)
            .ok_or_else(|| Error::UnknownBoss(config.boss.clone()))?;

        let discriminator = MaxHpDiscriminator::new(max_hp, &layout.entity);
        let catalog = EntityCatalog::new(&layout.catalog, config.collision_policy);
        let attacher = Attacher::new(provider, config.attach_config(&layout));

        Ok(Self {
            layout,
            config,
            attacher,
            catalog,
            discriminator: Box::new(discriminator),
            snapshot: None,
        })
    }

    /// Replace the boss discriminator.
    pub fn with_discriminator<D: Discriminator + 'static>(mut self, discriminator: D) -> Self {
        self.discriminator = Box::new(discriminator);
        self.snapshot = None;
        self
    }

    pub fn with_relauncher<R: Relauncher + 'static>(mut self, relauncher: R) -> Self {
        self.attacher.set_relauncher(Box::new(relauncher));
        self
    }

    pub fn layout(&self) -> &GameLayout {
        &self.layout
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    pub fn state(&self) -> AttachState {
        self.attacher.state()
    }

    pub fn session(&self) -> Option<&ProcessSession<P::Process>> {
        self.attacher.session()
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    pub fn discriminator(&self) -> &dyn Discriminator {
        self.discriminator.as_ref()
    }

    /// Root pointer from the last successful refresh.
    pub fn root_pointer(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|snapshot| snapshot.root)
    }

    /// Attach to the game, waiting up to the configured timeout.
    pub fn attach(&mut self) -> Result<()> {
        self.snapshot = None;
        self.attacher
            .attach(self.config.attach_timeout, self.config.allow_relaunch)
    }

    /// Reattach if the game restarted. Returns `true` when it did, in which
    /// case entities are unavailable until the next [`refresh`](Self::refresh).
    pub fn ensure_attached(&mut self) -> Result<bool> {
        let reattached = self.attacher.ensure_attached()?;
        if reattached {
            debug!("Session replaced, dropping cached entities");
            self.snapshot = None;
        }
        Ok(reattached)
    }

    pub fn detach(&mut self) {
        self.snapshot = None;
        self.attacher.detach();
    }

    /// Resolve the root pointer and rebuild the player and boss records.
    ///
    /// A boss that is not loaded does not fail the refresh; [`boss`](Self::boss)
    /// reports it as [`Error::EntityNotFound`]. Any other failure while looking
    /// for the boss (unreadable character set, broken record) is returned.
    pub fn refresh(&mut self) -> Result<()> {
        self.snapshot = None;
        let session = self.attacher.session().ok_or(Error::NotAttached)?;
        let info = session.info();

        let root = resolve_signature(session, info.base_address, info.module_size, &self.layout.root)?;
        debug!("Root pointer 0x{:X}", root);

        let player_walk = self.layout.player.walk(session, root);
        if !player_walk.is_clean() {
            return Err(Error::EntityNotFound("player".to_string()));
        }
        let player = EntityRecord::resolve(session, player_walk.address, &self.layout.entity)?;

        let boss = self
            .catalog
            .find_entity(session, root, self.discriminator.as_ref())
            .and_then(|record| EntityRecord::resolve(session, record, &self.layout.entity));
        let boss = match boss {
            Ok(record) => Some(record),
            Err(Error::EntityNotFound(what)) => {
                debug!("Boss {} not loaded: no slot with {}", self.config.boss, what);
                None
            }
            Err(e) => return Err(e),
        };

        self.snapshot = Some(Snapshot { root, player, boss });
        Ok(())
    }

    /// Reattach if needed and refresh when nothing is resolved yet, the
    /// session was replaced, or the boss has not been found. Returns whether a
    /// refresh ran.
    pub fn refresh_if_stale(&mut self) -> Result<bool> {
        let reattached = self.ensure_attached()?;
        let stale = match &self.snapshot {
            None => true,
            Some(snapshot) => snapshot.boss.is_none(),
        };
        if reattached || stale {
            self.refresh()?;
        }
        Ok(reattached || stale)
    }

    fn snapshot(&self) -> Result<(&ProcessSession<P::Process>, &Snapshot)> {
        let session = self.attacher.session().ok_or(Error::NotAttached)?;
        let snapshot = self.snapshot.as_ref().ok_or(Error::NotRefreshed)?;
        Ok((session, snapshot))
    }

    pub fn player(&self) -> Result<Entity<'_, ProcessSession<P::Process>>> {
        let (session, snapshot) = self.snapshot()?;
        Ok(snapshot.player.bind(session, &self.layout.entity))
    }

    pub fn boss(&self) -> Result<Entity<'_, ProcessSession<P::Process>>> {
        let (session, snapshot) = self.snapshot()?;
        snapshot
            .boss
            .as_ref()
            .map(|record| record.bind(session, &self.layout.entity))
            .ok_or_else(|| Error::EntityNotFound(self.config.boss.clone()))
    }

    fn poll_once<F>(&mut self, predicate: &mut F) -> Result<bool>
    where
        F: FnMut(&Self) -> Result<bool>,
    {
        self.ensure_attached()?;
        self.refresh()?;
        predicate(&*self)
    }

    /// Keep refreshing until `predicate` holds or `timeout` passes.
    ///
    /// Retryable errors (process restarting, boss not spawned yet) are waited
    /// out; fatal ones are returned. Returns `false` on timeout.
    pub fn wait_until<F>(&mut self, timeout: Duration, mut predicate: F) -> Result<bool>
    where
        F: FnMut(&Self) -> Result<bool>,
    {
        let start = Instant::now();
        loop {
            match self.poll_once(&mut predicate) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) if e.is_retryable() => debug!("Waiting: {}", e),
                Err(e) => return Err(e),
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                info!("Condition not met within {:?}", timeout);
                return Ok(false);
            }
            thread::sleep(self.config.poll_interval.min(timeout - elapsed));
        }
    }
}
