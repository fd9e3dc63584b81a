//! Runtime capability sets.
//!
//! A debuggee declares which kinds of edits its runtime can apply without a
//! restart. The set is immutable for the lifetime of an analysis session and
//! may be resolved lazily by the host; [`CapabilitySession`] memoizes that
//! resolution so it happens at most once.

use bitflags::bitflags;
use once_cell::sync::OnceCell;
use std::str::FromStr;

bitflags! {
    /// Edit kinds a running process can apply without restarting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EditCapabilities: u32 {
        /// Method body updates within existing members.
        const BASELINE = 1 << 0;
        const ADD_METHOD_TO_EXISTING_TYPE = 1 << 1;
        const ADD_STATIC_FIELD_TO_EXISTING_TYPE = 1 << 2;
        const ADD_INSTANCE_FIELD_TO_EXISTING_TYPE = 1 << 3;
        const NEW_TYPE_DEFINITION = 1 << 4;
        const CHANGE_CUSTOM_ATTRIBUTES = 1 << 5;
        const UPDATE_PARAMETERS = 1 << 6;
        const GENERIC_ADD_METHOD_TO_EXISTING_TYPE = 1 << 7;
        const GENERIC_UPDATE_METHOD = 1 << 8;
    }
}

impl EditCapabilities {
    /// Capabilities of a .NET-5-era runtime.
    pub fn net5() -> Self {
        Self::BASELINE
            | Self::ADD_METHOD_TO_EXISTING_TYPE
            | Self::ADD_STATIC_FIELD_TO_EXISTING_TYPE
            | Self::ADD_INSTANCE_FIELD_TO_EXISTING_TYPE
            | Self::NEW_TYPE_DEFINITION
    }

    /// Capabilities of a .NET-6-era runtime.
    pub fn net6() -> Self {
        Self::net5()
            | Self::CHANGE_CUSTOM_ATTRIBUTES
            | Self::UPDATE_PARAMETERS
            | Self::GENERIC_ADD_METHOD_TO_EXISTING_TYPE
            | Self::GENERIC_UPDATE_METHOD
    }

    /// Parse a comma- or whitespace-separated capability list. Each entry is
    /// either a group name (`baseline`, `net5`, `net6`) or a single
    /// capability name as declared by the runtime.
    pub fn parse_list(input: &str) -> Result<Self, String> {
        let mut caps = Self::empty();
        for part in input
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
        {
            caps |= part.parse()?;
        }
        if caps.is_empty() {
            return Err("capability list is empty".to_string());
        }
        Ok(caps)
    }
}

impl FromStr for EditCapabilities {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "baseline" => Ok(Self::BASELINE),
            "net5" => Ok(Self::net5()),
            "net6" => Ok(Self::net6()),
            "addmethodtoexistingtype" => Ok(Self::ADD_METHOD_TO_EXISTING_TYPE),
            "addstaticfieldtoexistingtype" => Ok(Self::ADD_STATIC_FIELD_TO_EXISTING_TYPE),
            "addinstancefieldtoexistingtype" => Ok(Self::ADD_INSTANCE_FIELD_TO_EXISTING_TYPE),
            "newtypedefinition" => Ok(Self::NEW_TYPE_DEFINITION),
            "changecustomattributes" => Ok(Self::CHANGE_CUSTOM_ATTRIBUTES),
            "updateparameters" => Ok(Self::UPDATE_PARAMETERS),
            "genericaddmethodtoexistingtype" => Ok(Self::GENERIC_ADD_METHOD_TO_EXISTING_TYPE),
            "genericupdatemethod" => Ok(Self::GENERIC_UPDATE_METHOD),
            other => Err(format!("unknown capability '{other}'")),
        }
    }
}

// --- Session-scoped lazy resolution --- //

type Resolver = Box<dyn Fn() -> EditCapabilities + Send + Sync>;

/// Capability source for one analysis session.
///
/// The host may not know the debuggee's capabilities until it has talked to
/// the attached runtime; the resolver runs at most once, on first use, and
/// the result is shared read-only across all documents of the session.
pub struct CapabilitySession {
    resolver: Resolver,
    resolved: OnceCell<EditCapabilities>,
}

impl CapabilitySession {
    pub fn fixed(caps: EditCapabilities) -> Self {
        Self {
            resolver: Box::new(move || caps),
            resolved: OnceCell::new(),
        }
    }

    pub fn with_resolver(resolver: impl Fn() -> EditCapabilities + Send + Sync + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
            resolved: OnceCell::new(),
        }
    }

    pub fn resolve(&self) -> EditCapabilities {
        *self.resolved.get_or_init(|| (self.resolver)())
    }
}

impl std::fmt::Debug for CapabilitySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilitySession")
            .field("resolved", &self.resolved.get())
            .finish()
    }
}

// --- Tests --- //

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn group_names_expand() {
        assert!(EditCapabilities::net5().contains(EditCapabilities::NEW_TYPE_DEFINITION));
        assert!(!EditCapabilities::net5().contains(EditCapabilities::UPDATE_PARAMETERS));
        assert!(EditCapabilities::net6().contains(EditCapabilities::UPDATE_PARAMETERS));
    }

    #[test]
    fn parse_list_accepts_mixed_entries() {
        let caps = EditCapabilities::parse_list("baseline,AddInstanceFieldToExistingType").unwrap();
        assert!(caps.contains(EditCapabilities::BASELINE));
        assert!(caps.contains(EditCapabilities::ADD_INSTANCE_FIELD_TO_EXISTING_TYPE));
        assert!(!caps.contains(EditCapabilities::NEW_TYPE_DEFINITION));

        assert!(EditCapabilities::parse_list("").is_err());
        assert!(EditCapabilities::parse_list("frobnicate").is_err());
    }

    #[test]
    fn session_resolves_at_most_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let session = CapabilitySession::with_resolver(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            EditCapabilities::net5()
        });

        assert_eq!(session.resolve(), EditCapabilities::net5());
        assert_eq!(session.resolve(), EditCapabilities::net5());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
