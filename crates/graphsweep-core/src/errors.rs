use graphsweep_core_types::RunId;
use thiserror::Error;

/// Result type alias using SweepError
pub type Result<T> = std::result::Result<T, SweepError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// This taxonomy provides a stable, structured classification of all errors
/// raised by graphsweep. Each kind maps to a stable error code that can be
/// used for programmatic error handling, testing, and host-facing reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Structural/Validation
    InvalidInput,
    InvalidConfig,
    InvalidPattern,
    NotFound,
    DanglingHandle,
    ShapeMismatch,
    TypeMismatch,

    // Addons
    AddonNotFound,
    HookFailed,

    // Run lifecycle
    AlreadyRunning,
    InvariantViolation,

    // Integration/IO
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::InvalidPattern => "ERR_INVALID_PATTERN",
            ExErrorKind::NotFound => "ERR_NOT_FOUND",
            ExErrorKind::DanglingHandle => "ERR_DANGLING_HANDLE",
            ExErrorKind::ShapeMismatch => "ERR_SHAPE_MISMATCH",
            ExErrorKind::TypeMismatch => "ERR_TYPE_MISMATCH",
            ExErrorKind::AddonNotFound => "ERR_ADDON_NOT_FOUND",
            ExErrorKind::HookFailed => "ERR_HOOK_FAILED",
            ExErrorKind::AlreadyRunning => "ERR_ALREADY_RUNNING",
            ExErrorKind::InvariantViolation => "ERR_INVARIANT_VIOLATION",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification kind for programmatic handling plus optional
/// context (operation, object, addon, snapshot) for debugging.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    object: Option<String>,
    addon: Option<String>,
    snapshot: Option<String>,
    run_id: Option<RunId>,
    message: String,
    source: Option<Box<ExError>>,
    candidates: Option<Vec<String>>,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            object: None,
            addon: None,
            snapshot: None,
            run_id: None,
            message: String::new(),
            source: None,
            candidates: None,
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add object context (usually a rendered handle)
    pub fn with_object(mut self, object: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self
    }

    /// Add addon context
    pub fn with_addon(mut self, addon: impl Into<String>) -> Self {
        self.addon = Some(addon.into());
        self
    }

    /// Add snapshot name context
    pub fn with_snapshot(mut self, name: impl Into<String>) -> Self {
        self.snapshot = Some(name.into());
        self
    }

    /// Add run ID context
    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = Some(run_id);
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add source error
    pub fn with_source(mut self, source: ExError) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Add candidate names (snapshots available for recovery, failing addons, ...)
    pub fn with_candidates(mut self, names: Vec<String>) -> Self {
        self.candidates = Some(names);
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Get the operation context, if any
    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    /// Get the object context, if any
    pub fn object(&self) -> Option<&str> {
        self.object.as_deref()
    }

    /// Get the addon context, if any
    pub fn addon(&self) -> Option<&str> {
        self.addon.as_deref()
    }

    /// Get the snapshot context, if any
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Get the run ID context, if any
    pub fn run_id(&self) -> Option<&RunId> {
        self.run_id.as_ref()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the source error, if any
    pub fn source_error(&self) -> Option<&ExError> {
        self.source.as_deref()
    }

    /// Get candidate names, if any
    pub fn candidates(&self) -> Option<&[String]> {
        self.candidates.as_deref()
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(object) = &self.object {
            write!(f, " (object: {})", object)?;
        }
        if let Some(addon) = &self.addon {
            write!(f, " (addon: {})", addon)?;
        }
        if let Some(snapshot) = &self.snapshot {
            write!(f, " (snapshot: {})", snapshot)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

// ========== End Error Facility ==========

/// Domain error taxonomy for graph collection, resolution and removal
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SweepError {
    // ===== Heap Errors =====
    /// Handle does not address a live object
    #[error("Dangling handle: {handle}")]
    DanglingHandle { handle: String },

    /// Object has a different body shape than the operation requires
    #[error("Object {handle} is a {actual}, expected {expected}")]
    ShapeMismatch {
        handle: String,
        expected: String,
        actual: String,
    },

    /// Type name is not interned in the heap
    #[error("Unknown type: {type_name}")]
    UnknownType { type_name: String },

    /// Heap has no root object to walk from
    #[error("Heap has no root object")]
    MissingRoot,

    // ===== Addon Errors =====
    /// Addon id is not registered
    #[error("Addon not found: {addon_id}")]
    AddonNotFound { addon_id: String },

    /// Addon does not declare a setting with this id
    #[error("Addon {addon_id} has no setting {setting_id}")]
    UnknownSetting {
        addon_id: String,
        setting_id: String,
    },

    /// Setting value has the wrong type
    #[error("Setting {setting_id} of addon {addon_id} expects a {expected} value")]
    SettingTypeMismatch {
        addon_id: String,
        setting_id: String,
        expected: String,
    },

    /// Namespace pattern failed to compile
    #[error("Invalid namespace pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A pre-clean, post-clean or wipe hook reported failure
    #[error("{hook} failed by addons: [{addons}]", addons = addons.join(", "))]
    HookFailed { hook: String, addons: Vec<String> },

    // ===== Run Errors =====
    /// A run is already in flight on this orchestrator
    #[error("The cleaner is already running")]
    AlreadyRunning,

    /// A removal handler failed after its dry-run succeeded
    #[error("Removing {object} from {parent} failed after a successful dry-run")]
    RemovalFailed { object: String, parent: String },

    /// An external snapshot failed
    #[error("Snapshot {name} failed")]
    SnapshotFailed { name: String },

    // ===== Configuration Errors =====
    /// Run configuration is invalid
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ===== Generic Errors =====
    /// Serialization error (JSON/TOML encoding/decoding)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// IO error
    #[error("IO error during {op}: {message}")]
    Io { op: String, message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Conversion from SweepError to ExError
///
/// Lets domain code keep returning `SweepError` while boundaries (the
/// orchestrator, the store, the CLI) speak the canonical facility.
impl From<SweepError> for ExError {
    fn from(err: SweepError) -> Self {
        let message = err.to_string();
        match err {
            SweepError::DanglingHandle { handle } => ExError::new(ExErrorKind::DanglingHandle)
                .with_object(handle)
                .with_message(message),

            SweepError::ShapeMismatch { handle, .. } => ExError::new(ExErrorKind::ShapeMismatch)
                .with_object(handle)
                .with_message(message),

            SweepError::UnknownType { .. } | SweepError::MissingRoot => {
                ExError::new(ExErrorKind::NotFound).with_message(message)
            }

            SweepError::AddonNotFound { addon_id } => ExError::new(ExErrorKind::AddonNotFound)
                .with_addon(addon_id)
                .with_message(message),

            SweepError::UnknownSetting { addon_id, .. } => ExError::new(ExErrorKind::NotFound)
                .with_addon(addon_id)
                .with_op("read_setting")
                .with_message(message),

            SweepError::SettingTypeMismatch { addon_id, .. } => {
                ExError::new(ExErrorKind::TypeMismatch)
                    .with_addon(addon_id)
                    .with_op("read_setting")
                    .with_message(message)
            }

            SweepError::InvalidPattern { .. } => {
                ExError::new(ExErrorKind::InvalidPattern).with_message(message)
            }

            SweepError::HookFailed { hook, addons } => ExError::new(ExErrorKind::HookFailed)
                .with_op(hook)
                .with_candidates(addons)
                .with_message(message),

            SweepError::AlreadyRunning => ExError::new(ExErrorKind::AlreadyRunning)
                .with_op("start")
                .with_message(message),

            SweepError::RemovalFailed { object, .. } => {
                ExError::new(ExErrorKind::InvariantViolation)
                    .with_op("remove")
                    .with_object(object)
                    .with_message(message)
            }

            SweepError::SnapshotFailed { name } => ExError::new(ExErrorKind::Persistence)
                .with_op("save_as")
                .with_snapshot(name)
                .with_message(message),

            SweepError::InvalidConfig { .. } => {
                ExError::new(ExErrorKind::InvalidConfig).with_message(message)
            }

            SweepError::Serialization { .. } => {
                ExError::new(ExErrorKind::Serialization).with_message(message)
            }

            SweepError::Io { op, .. } => ExError::new(ExErrorKind::Io)
                .with_op(op)
                .with_message(message),

            SweepError::Internal { .. } => {
                ExError::new(ExErrorKind::Internal).with_message(message)
            }
        }
    }
}

impl From<serde_json::Error> for SweepError {
    fn from(err: serde_json::Error) -> Self {
        SweepError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for SweepError {
    fn from(err: toml::de::Error) -> Self {
        SweepError::InvalidConfig {
            reason: err.to_string(),
        }
    }
}
