// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deterministic storage keys.
//!
//! A [`StorageKey`] names the owner of a correlation id and the action it was
//! recorded for. It renders to a canonical path shared by every backend:
//!
//! ```text
//! Application[/Environment][/User][/Action/correlation.json]
//! ```
//!
//! Every segment is restricted to `[A-Za-z0-9._-]+`.
//!
//! # Actions
//!
//! | Variant | Used by | Rendering |
//! |---------|---------|-----------|
//! | `Explicit` | Store, Load | segment as given |
//! | `Derived` | Store, Load | resolved against a [`CallerContext`] |
//! | `None` | Query | address only |
//!
//! A derived action is never resolved implicitly. The caller hands over the
//! frames it wants considered, nearest first:
//!
//! ```rust
//! use correlation_engine::key::{Action, CallFrame, CallerContext, StorageKey};
//!
//! let key = StorageKey::new("billing", Some("uat"), None, Action::derived("billing.api", 0)?)?;
//! let caller = CallerContext::from_frames(vec![
//!     CallFrame::new("billing.api", "InvoiceController", "create"),
//! ]);
//! let resolved = key.resolve(&caller)?;
//! assert_eq!(
//!     resolved.render(correlation_engine::key::RenderMode::Full)?,
//!     "billing/uat/billing.api.InvoiceController.create/correlation.json"
//! );
//! # Ok::<(), correlation_engine::ReplicationError>(())
//! ```

use crate::error::{ReplicationError, Result};
use std::fmt;
use std::str::FromStr;

/// File name appended to every action path.
pub const RECORD_NAME: &str = "correlation.json";

/// Namespace prefixes whose frames never qualify as an action.
const INFRASTRUCTURE_NAMESPACES: &[&str] = &[
    "std",
    "core",
    "alloc",
    "tokio",
    "futures",
    "correlation_engine",
];

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'
}

/// A single validated key segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeySegment(String);

impl KeySegment {
    /// Validate and wrap a segment.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if Self::is_valid(&value) {
            Ok(Self(value))
        } else {
            Err(ReplicationError::validation(format!(
                "invalid key segment {:?}: allowed characters are a-z, A-Z, 0-9 and '._-'",
                value
            )))
        }
    }

    /// Check a candidate segment without allocating.
    pub fn is_valid(value: &str) -> bool {
        !value.is_empty() && value.chars().all(is_segment_char)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for KeySegment {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for KeySegment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An action to be picked from the caller's frames.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivedAction {
    namespace: String,
    offset: usize,
}

impl DerivedAction {
    /// `namespace` may use `.` or `::` separators. `offset` skips that many
    /// qualifying frames (0 = nearest caller).
    pub fn new(namespace: &str, offset: i64) -> Result<Self> {
        let namespace = normalize_namespace(namespace);
        if !KeySegment::is_valid(&namespace) {
            return Err(ReplicationError::validation(format!(
                "invalid action namespace {:?}",
                namespace
            )));
        }
        let offset = usize::try_from(offset).map_err(|_| {
            ReplicationError::validation(format!("action offset must not be negative, got {}", offset))
        })?;
        Ok(Self { namespace, offset })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// The action part of a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Explicit(KeySegment),
    Derived(DerivedAction),
    /// Address-only key, for queries.
    None,
}

impl Action {
    pub fn explicit(value: impl Into<String>) -> Result<Self> {
        KeySegment::new(value).map(Action::Explicit)
    }

    pub fn derived(namespace: &str, offset: i64) -> Result<Self> {
        DerivedAction::new(namespace, offset).map(Action::Derived)
    }
}

/// How much of a key to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// `Application[/Environment][/User][/Action/correlation.json]`
    Full,
    /// `Action/correlation.json`, or empty for address-only keys.
    ActionSuffix,
}

/// One logical frame of the caller's call chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub namespace: String,
    pub type_name: String,
    pub method: String,
    /// Closures, async state machines and other generated code.
    pub generated: bool,
}

impl CallFrame {
    pub fn new(
        namespace: impl Into<String>,
        type_name: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            namespace: normalize_namespace(&namespace.into()),
            type_name: type_name.into(),
            method: method.into(),
            generated: false,
        }
    }

    /// Mark the frame as generated code.
    pub fn generated(mut self) -> Self {
        self.generated = true;
        self
    }

    fn is_infrastructure(&self) -> bool {
        self.generated
            || self.type_name.contains('<')
            || self.method.contains('<')
            || self.method.contains("{{")
            || INFRASTRUCTURE_NAMESPACES
                .iter()
                .any(|p| self.namespace == *p || self.namespace.starts_with(&format!("{}.", p)))
    }

    fn action_name(&self) -> String {
        if self.type_name.is_empty() {
            format!("{}.{}", self.namespace, self.method)
        } else {
            format!("{}.{}.{}", self.namespace, self.type_name, self.method)
        }
    }
}

/// Build a [`CallFrame`] for the current module.
///
/// ```rust
/// let frame = correlation_engine::call_frame!("Worker", "run");
/// assert_eq!(frame.method, "run");
/// ```
#[macro_export]
macro_rules! call_frame {
    ($type_name:expr, $method:expr) => {
        $crate::key::CallFrame::new(module_path!(), $type_name, $method)
    };
    ($method:expr) => {
        $crate::key::CallFrame::new(module_path!(), "", $method)
    };
}

/// The caller's logical call chain, nearest frame first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    frames: Vec<CallFrame>,
}

impl CallerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: Vec<CallFrame>) -> Self {
        Self { frames }
    }

    /// Append an outer frame.
    pub fn push(&mut self, frame: CallFrame) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    /// Pick the frame `offset` positions past the nearest frame under `namespace`.
    fn select(&self, namespace: &str, offset: usize) -> Option<&CallFrame> {
        self.frames
            .iter()
            .filter(|f| !f.is_infrastructure())
            .filter(|f| f.namespace.starts_with(namespace))
            .nth(offset)
    }
}

fn normalize_namespace(namespace: &str) -> String {
    namespace.trim().replace("::", ".")
}

/// Paths handed to backend adapters for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPath {
    /// `Application[/Environment][/User]`
    pub address: String,
    /// `Action/correlation.json`
    pub action_suffix: String,
    /// `address/action_suffix`
    pub full: String,
}

/// A deterministic key for a correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    application: KeySegment,
    environment: Option<KeySegment>,
    user: Option<KeySegment>,
    action: Action,
}

impl StorageKey {
    /// Build a key from raw segments.
    pub fn new(
        application: &str,
        environment: Option<&str>,
        user: Option<&str>,
        action: Action,
    ) -> Result<Self> {
        Ok(Self {
            application: KeySegment::new(application)?,
            environment: environment.map(KeySegment::new).transpose()?,
            user: user.map(KeySegment::new).transpose()?,
            action,
        })
    }

    /// Build an address-only key (for queries).
    pub fn address(application: &str, environment: Option<&str>, user: Option<&str>) -> Result<Self> {
        Self::new(application, environment, user, Action::None)
    }

    /// Copy of this key with an explicit action attached.
    pub fn with_action(&self, action: KeySegment) -> Self {
        Self {
            action: Action::Explicit(action),
            ..self.clone()
        }
    }

    /// Copy of this key whose action is derived from the caller.
    pub fn with_derived_action(&self, action: DerivedAction) -> Self {
        Self {
            action: Action::Derived(action),
            ..self.clone()
        }
    }

    /// Copy of this key with its action removed.
    pub fn without_action(&self) -> Self {
        Self {
            action: Action::None,
            ..self.clone()
        }
    }

    pub fn application(&self) -> &KeySegment {
        &self.application
    }

    pub fn environment(&self) -> Option<&KeySegment> {
        self.environment.as_ref()
    }

    pub fn user(&self) -> Option<&KeySegment> {
        self.user.as_ref()
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// False only for address-only keys.
    pub fn has_action(&self) -> bool {
        !matches!(self.action, Action::None)
    }

    /// Resolve the action segment, consulting `caller` for derived actions.
    pub fn resolve_action(&self, caller: &CallerContext) -> Result<Option<KeySegment>> {
        match &self.action {
            Action::Explicit(segment) => Ok(Some(segment.clone())),
            Action::None => Ok(None),
            Action::Derived(derived) => {
                let frame = caller
                    .select(derived.namespace(), derived.offset())
                    .ok_or_else(|| {
                        ReplicationError::Resolution(format!(
                            "unable to determine the calling method from namespace: {}, with offset: {}",
                            derived.namespace(),
                            derived.offset()
                        ))
                    })?;
                let name = frame.action_name();
                KeySegment::new(name.clone()).map(Some).map_err(|_| {
                    ReplicationError::Resolution(format!(
                        "caller {:?} does not form a valid action segment",
                        name
                    ))
                })
            }
        }
    }

    /// Copy of this key with any derived action replaced by its resolution.
    pub fn resolve(&self, caller: &CallerContext) -> Result<Self> {
        Ok(match self.resolve_action(caller)? {
            Some(action) => self.with_action(action),
            None => self.clone(),
        })
    }

    /// The `Application[/Environment][/User]` part.
    pub fn address_path(&self) -> String {
        let mut path = self.application.as_str().to_string();
        for segment in [&self.environment, &self.user].into_iter().flatten() {
            path.push('/');
            path.push_str(segment.as_str());
        }
        path
    }

    /// Render the key. Derived actions must be resolved first.
    pub fn render(&self, mode: RenderMode) -> Result<String> {
        let action = match &self.action {
            Action::Explicit(segment) => Some(segment),
            Action::None => None,
            Action::Derived(derived) => {
                return Err(ReplicationError::Resolution(format!(
                    "derived action for namespace {} must be resolved against a caller context before rendering",
                    derived.namespace()
                )))
            }
        };

        Ok(match (mode, action) {
            (RenderMode::Full, None) => self.address_path(),
            (RenderMode::Full, Some(action)) => {
                format!("{}/{}/{}", self.address_path(), action, RECORD_NAME)
            }
            (RenderMode::ActionSuffix, None) => String::new(),
            (RenderMode::ActionSuffix, Some(action)) => format!("{}/{}", action, RECORD_NAME),
        })
    }

    /// All paths an adapter needs for this record. Requires an action.
    pub fn record_path(&self) -> Result<RecordPath> {
        if !self.has_action() {
            return Err(ReplicationError::bad_request(
                "key has no action; store and load require one",
            ));
        }
        Ok(RecordPath {
            address: self.address_path(),
            action_suffix: self.render(RenderMode::ActionSuffix)?,
            full: self.render(RenderMode::Full)?,
        })
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.action {
            Action::Explicit(action) => write!(f, "{}/{}/{}", self.address_path(), action, RECORD_NAME),
            Action::Derived(derived) => write!(
                f,
                "{}/<{}+{}>/{}",
                self.address_path(),
                derived.namespace(),
                derived.offset(),
                RECORD_NAME
            ),
            Action::None => f.write_str(&self.address_path()),
        }
    }
}

/// A rendered full path split back into segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    /// Application, then the optional environment and user.
    pub address: Vec<KeySegment>,
    pub action: Option<KeySegment>,
}

impl KeyPath {
    /// Parse `Application[/..][/Action/correlation.json]`.
    ///
    /// Environment and user cannot be told apart from the path alone, so
    /// the address comes back as a plain list.
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split('/').collect();
        let (address, action) = match parts.as_slice() {
            [address @ .., action, record] if *record == RECORD_NAME && !address.is_empty() => {
                (address, Some(KeySegment::new(*action)?))
            }
            address => (address, None),
        };

        if address.is_empty() || address.len() > 3 {
            return Err(ReplicationError::validation(format!(
                "key path {:?} must have between one and three address segments",
                path
            )));
        }

        Ok(Self {
            address: address
                .iter()
                .map(|s| KeySegment::new(*s))
                .collect::<Result<Vec<_>>>()?,
            action,
        })
    }
}
