//! Store definitions and synchronization policies.
//!
//! A store is a named compartment of the library root. Its layout decides
//! how claims map onto disk:
//! - `Raw`: free-form directory, never scoped by claim
//! - `PerClaimDirectory`: one directory per claim token
//! - `PerClaimFile`: one file per claim token, with an optional fixed extension
//!
//! The policy attached at registration decides whether, and how, content
//! staged in an isolation sandbox reaches the main library.

use crate::claim::{ClaimKey, ClaimType, is_valid_token};
use crate::{DefinitionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Structural kind of a store, without its claim parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    Raw,
    PerClaimDirectory,
    PerClaimFile,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raw => "raw",
            Self::PerClaimDirectory => "per-claim-directory",
            Self::PerClaimFile => "per-claim-file",
        };
        f.write_str(name)
    }
}

/// On-disk layout of a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "kebab-case")]
pub enum StoreLayout {
    Raw,
    PerClaimDirectory {
        claim_type: ClaimType,
    },
    PerClaimFile {
        claim_type: ClaimType,
        #[serde(default)]
        extension: Option<String>,
    },
}

impl StoreLayout {
    pub fn kind(&self) -> StoreKind {
        match self {
            Self::Raw => StoreKind::Raw,
            Self::PerClaimDirectory { .. } => StoreKind::PerClaimDirectory,
            Self::PerClaimFile { .. } => StoreKind::PerClaimFile,
        }
    }
}

/// How sandbox content for a store is published back to the main library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorePolicy {
    /// Main library only; forbidden inside any sandbox.
    Private,
    /// Sandbox files replace matching main-library files; unrelated files stay.
    Overwrite,
    /// Sandbox content replaces the claim's main-library directory or file outright.
    FullSwap,
    /// Sandbox content is never copied back.
    Discard,
}

impl StorePolicy {
    /// Whether sandboxes may claim scopes in stores with this policy.
    pub fn allows_sandbox(&self) -> bool {
        !matches!(self, Self::Private)
    }

    /// Whether committing a sandbox copies content back for this policy.
    pub fn syncs_back(&self) -> bool {
        matches!(self, Self::Overwrite | Self::FullSwap)
    }
}

impl fmt::Display for StorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Private => "private",
            Self::Overwrite => "overwrite",
            Self::FullSwap => "full-swap",
            Self::Discard => "discard",
        };
        f.write_str(name)
    }
}

/// Definition of a named store. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreDef {
    name: String,
    #[serde(flatten)]
    layout: StoreLayout,
    /// Marks stores whose content is meant to be produced inside sandboxes.
    #[serde(default)]
    sandbox_editable: bool,
}

impl StoreDef {
    fn build(name: impl Into<String>, layout: StoreLayout) -> Result<Self> {
        let def = Self {
            name: name.into(),
            layout,
            sandbox_editable: false,
        };
        def.validate()?;
        Ok(def)
    }

    /// A free-form store with no claim structure.
    pub fn raw(name: impl Into<String>) -> Result<Self> {
        Self::build(name, StoreLayout::Raw)
    }

    /// A store holding one directory per claim.
    pub fn per_claim_directory(name: impl Into<String>, claim_type: ClaimType) -> Result<Self> {
        Self::build(name, StoreLayout::PerClaimDirectory { claim_type })
    }

    /// A store holding one file per claim, named `<token>.<extension>`.
    pub fn per_claim_file(
        name: impl Into<String>,
        claim_type: ClaimType,
        extension: Option<&str>,
    ) -> Result<Self> {
        Self::build(
            name,
            StoreLayout::PerClaimFile {
                claim_type,
                extension: extension.map(str::to_string),
            },
        )
    }

    /// Marks the store as edited through sandboxes.
    #[must_use]
    pub fn sandbox_editable(mut self) -> Self {
        self.sandbox_editable = true;
        self
    }

    /// Checks the name and extension tokens. Definitions built through the
    /// constructors are always valid; deserialized ones must be checked.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_token(&self.name) {
            return Err(DefinitionError::InvalidStoreName(self.name.clone()));
        }
        if let StoreLayout::PerClaimFile {
            extension: Some(ext),
            ..
        } = &self.layout
        {
            if !is_valid_token(ext) {
                return Err(DefinitionError::InvalidExtension(
                    ext.clone(),
                    self.name.clone(),
                ));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn kind(&self) -> StoreKind {
        self.layout.kind()
    }

    pub fn is_claim_scoped(&self) -> bool {
        !matches!(self.layout, StoreLayout::Raw)
    }

    pub fn is_sandbox_editable(&self) -> bool {
        self.sandbox_editable
    }

    pub fn claim_type(&self) -> Option<&ClaimType> {
        match &self.layout {
            StoreLayout::Raw => None,
            StoreLayout::PerClaimDirectory { claim_type }
            | StoreLayout::PerClaimFile { claim_type, .. } => Some(claim_type),
        }
    }

    pub fn extension(&self) -> Option<&str> {
        match &self.layout {
            StoreLayout::PerClaimFile { extension, .. } => extension.as_deref(),
            _ => None,
        }
    }

    /// Whether `policy` may be attached to this store.
    ///
    /// `Private` stores cannot be sandbox-editable: publishing sandbox edits
    /// is exactly what `Private` forbids.
    pub fn accepts_policy(&self, policy: StorePolicy) -> bool {
        !(policy == StorePolicy::Private && self.sandbox_editable)
    }

    /// Verifies that `claim` can address an entry of this store.
    pub fn check_claim(&self, claim: &ClaimKey) -> Result<()> {
        let expected = self
            .claim_type()
            .ok_or_else(|| DefinitionError::RawStore(self.name.clone()))?;
        if expected != claim.claim_type() {
            return Err(DefinitionError::ClaimTypeMismatch {
                store: self.name.clone(),
                expected: expected.to_string(),
                actual: claim.claim_type().to_string(),
            });
        }
        Ok(())
    }

    /// On-disk name of `claim`'s entry within this store.
    pub fn entry_name(&self, claim: &ClaimKey) -> String {
        match self.extension() {
            Some(ext) => format!("{}.{}", claim.token(), ext),
            None => claim.token().to_string(),
        }
    }
}

impl fmt::Display for StoreDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
