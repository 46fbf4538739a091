//! Runtime backend discovery.
//!
//! Backends are found at run time rather than linked: each library is opened
//! by name and its symbol table resolved. A missing library, or one missing a
//! single symbol, just leaves that backend out.

use std::ffi::OsString;
use std::sync::OnceLock;

use tracing::debug;

use crate::backend::{AvifBackend, Backend, BackendKind, HeifBackend, avif, heif};
use crate::error::LoadError;

/// Environment variable naming the libavif to open instead of the default.
pub const AVIF_LIBRARY_ENV: &str = "ZENDYN_AVIF_LIBRARY";
/// Environment variable naming the libheif to open instead of the default.
pub const HEIF_LIBRARY_ENV: &str = "ZENDYN_HEIF_LIBRARY";

/// Set of loaded backends as a bitmask: bit 0 is libavif, bit 1 is libheif.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Capabilities(0);
    pub const AVIF: Self = Capabilities(1 << 0);
    pub const HEIF: Self = Capabilities(1 << 1);

    pub fn all() -> Self {
        Self::AVIF | Self::HEIF
    }

    /// Build from raw bits; unknown bits are dropped.
    pub fn from_bits(bits: u8) -> Self {
        Capabilities(bits & Self::all().0)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn has_any(self) -> bool {
        self.0 != 0
    }

    pub fn has_avif(self) -> bool {
        self.contains(BackendKind::Avif)
    }

    pub fn has_heif(self) -> bool {
        self.contains(BackendKind::Heif)
    }

    pub fn contains(self, kind: BackendKind) -> bool {
        (self.0 & Self::bit(kind)) != 0
    }

    pub fn insert(&mut self, kind: BackendKind) {
        self.0 |= Self::bit(kind);
    }

    /// Loaded backends, libavif first.
    pub fn iter(self) -> impl Iterator<Item = BackendKind> {
        BackendKind::ALL.into_iter().filter(move |&k| self.contains(k))
    }

    fn bit(kind: BackendKind) -> u8 {
        match kind {
            BackendKind::Avif => Self::AVIF.0,
            BackendKind::Heif => Self::HEIF.0,
        }
    }
}

impl core::ops::BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Capabilities(self.0 | rhs.0)
    }
}

/// Where to look for each library, tried in order.
#[derive(Clone, Debug)]
pub struct LibraryPaths {
    pub avif: Vec<OsString>,
    pub heif: Vec<OsString>,
}

impl LibraryPaths {
    /// Platform default names, then the versioned sonames of known ABIs.
    pub fn platform() -> Self {
        fn names(default: &str, fallbacks: &[&str]) -> Vec<OsString> {
            std::iter::once(default)
                .chain(fallbacks.iter().copied())
                .map(OsString::from)
                .collect()
        }
        Self {
            avif: names(avif::DEFAULT_LIBRARY, avif::FALLBACK_LIBRARIES),
            heif: names(heif::DEFAULT_LIBRARY, heif::FALLBACK_LIBRARIES),
        }
    }

    /// Platform defaults, preceded by [`AVIF_LIBRARY_ENV`] / [`HEIF_LIBRARY_ENV`]
    /// when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let mut paths = Self::platform();
        if let Some(path) = lookup(AVIF_LIBRARY_ENV).filter(|p| !p.is_empty()) {
            paths.avif.insert(0, path);
        }
        if let Some(path) = lookup(HEIF_LIBRARY_ENV).filter(|p| !p.is_empty()) {
            paths.heif.insert(0, path);
        }
        paths
    }

    /// No candidates: loading with these paths yields no backends.
    pub fn empty() -> Self {
        Self {
            avif: Vec::new(),
            heif: Vec::new(),
        }
    }

    pub fn candidates(&self, kind: BackendKind) -> &[OsString] {
        match kind {
            BackendKind::Avif => &self.avif,
            BackendKind::Heif => &self.heif,
        }
    }
}

impl Default for LibraryPaths {
    fn default() -> Self {
        Self::from_env()
    }
}

/// The backends available to a request.
///
/// Built once per process by [`load`]; a separate set can be built with
/// [`Backends::discover_with`] or [`Backends::none`] and passed to a request.
#[derive(Debug, Default)]
pub struct Backends {
    avif: Option<AvifBackend>,
    heif: Option<HeifBackend>,
}

impl Backends {
    /// No backends loaded.
    pub fn none() -> Self {
        Self::default()
    }

    /// Search the default locations (with environment overrides).
    pub fn discover() -> Self {
        Self::discover_with(&LibraryPaths::from_env())
    }

    /// Open each backend independently from the given locations.
    pub fn discover_with(paths: &LibraryPaths) -> Self {
        let avif = first_loaded(BackendKind::Avif, paths.candidates(BackendKind::Avif), |p| {
            AvifBackend::open(p)
        });
        let heif = first_loaded(BackendKind::Heif, paths.candidates(BackendKind::Heif), |p| {
            HeifBackend::open(p)
        });
        Self::from_parts(avif.ok(), heif.ok())
    }

    /// Assemble from already opened backends.
    pub fn from_parts(avif: Option<AvifBackend>, heif: Option<HeifBackend>) -> Self {
        Self { avif, heif }
    }

    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::NONE;
        if self.avif.is_some() {
            caps.insert(BackendKind::Avif);
        }
        if self.heif.is_some() {
            caps.insert(BackendKind::Heif);
        }
        caps
    }

    pub fn avif(&self) -> Option<&AvifBackend> {
        self.avif.as_ref()
    }

    pub fn heif(&self) -> Option<&HeifBackend> {
        self.heif.as_ref()
    }

    /// The decode side of a backend, if loaded.
    pub fn get(&self, kind: BackendKind) -> Option<&dyn Backend> {
        match kind {
            BackendKind::Avif => self.avif.as_ref().map(|b| b as &dyn Backend),
            BackendKind::Heif => self.heif.as_ref().map(|b| b as &dyn Backend),
        }
    }
}

/// Try each candidate until one opens with a full symbol table.
fn first_loaded<T>(
    kind: BackendKind,
    candidates: &[OsString],
    open: impl Fn(&OsString) -> Result<T, LoadError>,
) -> Result<T, LoadError> {
    let mut last = LoadError::NoCandidates(kind);
    for candidate in candidates {
        match open(candidate) {
            Ok(backend) => return Ok(backend),
            Err(e) => {
                debug!("{kind} unavailable: {e}");
                last = e;
            }
        }
    }
    Err(last)
}

static BACKENDS: OnceLock<Backends> = OnceLock::new();

/// Process-wide backends, discovered on first use.
pub(crate) fn global() -> &'static Backends {
    BACKENDS.get_or_init(Backends::discover)
}

/// Look for libavif and libheif and report which loaded.
///
/// The search runs once per process; later calls return the same result.
/// Decode, encode and config call this implicitly.
pub fn load() -> Capabilities {
    global().capabilities()
}
