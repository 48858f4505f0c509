//! Endpoint identity and name resolution.

use std::sync::Arc;

use super::EndpointInfo;

/// Identifier a backend uses to reopen a capture or render endpoint.
///
/// A device name for cpal, a device path or session key elsewhere. Cloning
/// is cheap, so route threads and events carry it by value.
///
/// Two routes touch the same physical endpoint exactly when their ids are
/// equal; the app-route feedback check relies on this.
///
/// # Example
///
/// ```
/// use route_audio::{EndpointId, EndpointInfo};
///
/// let info = EndpointInfo::new("hw:1,0", "USB Headset");
/// let id = EndpointId::from(&info);
///
/// assert_eq!(id.as_str(), "hw:1,0");
/// assert!(id.names(&info, "usb headset"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(Arc<str>);

impl EndpointId {
    /// Wraps a backend identifier.
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// The backend identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if `name` refers to this endpoint as listed by `info`.
    ///
    /// Ids compare exactly; display names ignore case and surrounding
    /// whitespace.
    pub fn names(&self, info: &EndpointInfo, name: &str) -> bool {
        let name = name.trim();
        self.as_str() == name || info.display_name.trim().eq_ignore_ascii_case(name)
    }
}

/// Picks the endpoint `name` refers to.
///
/// An exact id match wins over a display-name match, so a device whose
/// display name equals another device's id cannot shadow it. Among display
/// names the first listed wins. An empty `name` never matches.
pub(crate) fn resolve_name(endpoints: &[EndpointInfo], name: &str) -> Option<EndpointId> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    endpoints
        .iter()
        .find(|info| info.id.as_str() == name)
        .or_else(|| endpoints.iter().find(|info| info.id.names(info, name)))
        .map(EndpointId::from)
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&EndpointInfo> for EndpointId {
    fn from(info: &EndpointInfo) -> Self {
        info.id.clone()
    }
}

impl From<&str> for EndpointId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EndpointId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for EndpointId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing() -> Vec<EndpointInfo> {
        vec![
            EndpointInfo::new("hw:0,0", "Built-in Output"),
            EndpointInfo::new("hw:1,0", "USB Headset"),
            // Display name collides with the first device's id
            EndpointInfo::new("hw:2,0", "hw:0,0"),
        ]
    }

    #[test]
    fn test_resolve_by_id_or_display_name() {
        let endpoints = listing();
        assert_eq!(
            resolve_name(&endpoints, "hw:1,0"),
            Some(EndpointId::new("hw:1,0"))
        );
        assert_eq!(
            resolve_name(&endpoints, "  usb HEADSET "),
            Some(EndpointId::new("hw:1,0"))
        );
    }

    #[test]
    fn test_id_match_wins_over_display_name() {
        assert_eq!(
            resolve_name(&listing(), "hw:0,0"),
            Some(EndpointId::new("hw:0,0"))
        );
    }

    #[test]
    fn test_empty_or_unknown_name_does_not_resolve() {
        let endpoints = listing();
        assert_eq!(resolve_name(&endpoints, ""), None);
        assert_eq!(resolve_name(&endpoints, "   "), None);
        assert_eq!(resolve_name(&endpoints, "Bluetooth"), None);
    }

    #[test]
    fn test_ids_compare_exactly() {
        let info = EndpointInfo::new("Speakers", "Speakers");
        let id = EndpointId::from(&info);
        assert!(id.names(&info, "speakers"));
        assert_ne!(id, EndpointId::new("speakers"));
        assert_eq!(id.to_string(), "Speakers");
    }
}
