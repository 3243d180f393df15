//! Run configuration
//!
//! Everything here is chosen once per run and never changes while stepping.
//! Each policy enum parses from the spelling used on the command line and
//! fails with [`CeskError::UnknownConfiguration`] otherwise.
//!
//! OpenMP settings are read from the `OMP_*` variables through an injectable
//! lookup so tests can supply their own environment.

use super::errors::CeskError;
use crate::memory::limits::LimitsProfile;
use std::fmt;
use std::str::FromStr;

macro_rules! config_enum {
    ($(#[$meta:meta])* $name:ident, $key:literal, { $($variant:ident => $($spelling:literal)|+),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            #[default]
            $($variant),+
        }

        impl FromStr for $name {
            type Err = CeskError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_lowercase().as_str() {
                    $($($spelling)|+ => Ok($name::$variant),)+
                    _ => Err(CeskError::unknown_configuration($key, s)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $($name::$variant => [$($spelling),+][0],)+
                };
                f.write_str(name)
            }
        }
    };
}

config_enum!(
    /// Value interpretation selected at startup
    ValueDomain, "interpretation", {
        Concrete => "concrete",
        Sign => "sign",
        Bounded => "bounded" | "k-bounded"
    }
);

config_enum!(
    /// Behavior of a second write to the same address
    StoreUpdate, "store_update", {
        Strong => "strong",
        Weak => "weak"
    }
);

config_enum!(
    /// Continuation address allocation
    KontAlloc, "kont_alloc", {
        Concrete => "concrete",
        ZeroCfa => "0-cfa" | "0cfa",
        P4f => "p4f"
    }
);

config_enum!(
    /// Frame allocation
    FrameAlloc, "frame_alloc", {
        Concrete => "concrete",
        ZeroCfa => "0-cfa" | "0cfa"
    }
);

config_enum!(
    /// Heap block allocation
    HeapAlloc, "heap_alloc", {
        Concrete => "concrete",
        Abstract => "abstract"
    }
);

config_enum!(
    /// `OMP_SCHEDULE` kind; recorded, every loop is split one task per iteration
    OmpSchedule, "OMP_SCHEDULE", {
        Dynamic => "dynamic",
        Static => "static",
        Guided => "guided",
        Auto => "auto"
    }
);

/// Seed values for the OpenMP runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmpSettings {
    pub num_threads: usize,
    pub thread_limit: usize,
    pub dynamic: bool,
    pub nested: bool,
    pub max_active_levels: usize,
    pub schedule: OmpSchedule,
}

impl Default for OmpSettings {
    fn default() -> Self {
        OmpSettings {
            num_threads: 2,
            thread_limit: 2,
            dynamic: true,
            nested: false,
            max_active_levels: 1,
            schedule: OmpSchedule::Dynamic,
        }
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize, CeskError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CeskError::unknown_configuration(key, raw)),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, CeskError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(CeskError::unknown_configuration(key, raw)),
    }
}

impl OmpSettings {
    /// Read the `OMP_*` variables through `lookup`; unset variables keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CeskError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = OmpSettings::default();
        if let Some(raw) = lookup("OMP_NUM_THREADS") {
            // a list sets the nested levels; only the outermost is used
            let first = raw.split(',').next().unwrap_or_default();
            settings.num_threads = parse_count("OMP_NUM_THREADS", first)?;
        }
        if let Some(raw) = lookup("OMP_THREAD_LIMIT") {
            settings.thread_limit = parse_count("OMP_THREAD_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("OMP_DYNAMIC") {
            settings.dynamic = parse_flag("OMP_DYNAMIC", &raw)?;
        }
        if let Some(raw) = lookup("OMP_NESTED") {
            settings.nested = parse_flag("OMP_NESTED", &raw)?;
        }
        if let Some(raw) = lookup("OMP_MAX_ACTIVE_LEVELS") {
            settings.max_active_levels = parse_count("OMP_MAX_ACTIVE_LEVELS", &raw)?;
        }
        if let Some(raw) = lookup("OMP_SCHEDULE") {
            let kind = raw.split(',').next().unwrap_or_default().trim();
            settings.schedule = kind.parse()?;
        }
        Ok(settings)
    }

    /// Read the process environment
    pub fn from_env() -> Result<Self, CeskError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

/// Everything a run needs besides the program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub domain: ValueDomain,
    pub store_update: StoreUpdate,
    pub kont_alloc: KontAlloc,
    pub frame_alloc: FrameAlloc,
    pub heap_alloc: HeapAlloc,
    pub limits: LimitsProfile,
    pub omp: OmpSettings,
    /// Scheduler steps before the run is abandoned
    pub max_steps: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            domain: ValueDomain::default(),
            store_update: StoreUpdate::default(),
            kont_alloc: KontAlloc::default(),
            frame_alloc: FrameAlloc::default(),
            heap_alloc: HeapAlloc::default(),
            limits: LimitsProfile::default(),
            omp: OmpSettings::default(),
            max_steps: 1_000_000,
        }
    }
}

impl Config {
    /// Abstract value domains need weak updates to stay sound
    pub fn is_abstract(&self) -> bool {
        self.domain != ValueDomain::Concrete
    }
}
