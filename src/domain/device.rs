/// A device known to the gateway, resolved from the inventory.
///
/// `unique_id` is the stable hardware identifier; `path_id` is the
/// gateway-local resource id, which may be reassigned across gateway
/// restarts and must not be used as a key anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub unique_id: String,
    pub r#type: String,
    pub name: String,
    pub path_id: String,
}
