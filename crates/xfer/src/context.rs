//! The handful of process-wide singletons every session, copy, and pool
//! lookup shares: configuration, verbosity, the response cache, and the
//! idle-session pool. An embedder constructs one `Context` at startup and
//! threads it through every site it talks to.

use std::cell::RefCell;
use std::rc::Rc;

use config::{CacheConfig, Settings};
use logging::VerbosityConfig;
use scheduler::Scheduler;
use xfer_cache::{ExpireHelper, ResponseCache};
use xfer_pool::Pool;

use crate::session::AnySession;

/// Idle sessions kept alive per site-pool capacity, absent a dedicated
/// `pool:size` config key in the Settings table this workspace defines.
const DEFAULT_POOL_CAPACITY: usize = 8;

pub struct Context {
    pub settings: Settings,
    pub verbosity: VerbosityConfig,
    pub cache: Rc<RefCell<ResponseCache>>,
    pub pool: Pool<AnySession>,
    pub scheduler: Scheduler,
}

impl Context {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        let cache_cfg = CacheConfig::from_settings(&settings, None);
        let cache = Rc::new(RefCell::new(ResponseCache::new(cache_cfg.size)));
        cache.borrow_mut().set_ttl(cache_cfg.expire);

        let mut scheduler = Scheduler::new();
        if cache_cfg.enable {
            scheduler.spawn(Box::new(ExpireHelper::new(cache.clone())), None);
        }

        Self {
            settings,
            verbosity: VerbosityConfig::new(),
            cache,
            pool: Pool::new(DEFAULT_POOL_CAPACITY),
            scheduler,
        }
    }
}
