//! Shape of the out-of-scope gateway collaborator: the external
//! API/gateway client is not this crate's concern, only the event and
//! command shape it delivers and accepts. No networking, no session
//! handling, no wire frames — just the two trait seams a real gateway
//! connector would implement against, keeping "what a caller can ask
//! for" separate from how it's actually carried over the wire.

/// Something the gateway collaborator delivers to the archive as a
/// real-time event or backfill result. Each concrete event in this module names one such shape;
/// a real connector translates platform-specific wire events into these.
pub trait GatewayEvent: Send + 'static {}

/// Something the archive may ask the gateway collaborator to do, such as
/// backfilling history for a channel it has not fully archived yet.
pub trait GatewayCommand: Send + 'static {
    type Response: Send + 'static;
}

/// A snapshot was created or changed for some object kind/id.
pub struct UpsertSnapshotEvent {
    pub kind: archiver_core::ObjectKind,
    pub id: String,
    pub parent_id: Option<String>,
}

impl GatewayEvent for UpsertSnapshotEvent {}

/// The platform reported an object (of any snapshot-backed kind) as
/// deleted.
pub struct DeleteSnapshotEvent {
    pub kind: archiver_core::ObjectKind,
    pub id: String,
}

impl GatewayEvent for DeleteSnapshotEvent {}

/// A reaction was placed on, or removed from, a message.
pub struct ReactionPlacementEvent {
    pub message_id: String,
    pub removed: bool,
}

impl GatewayEvent for ReactionPlacementEvent {}

/// A member left (or was removed from) a server.
pub struct MemberLeaveEvent {
    pub server_id: String,
    pub user_id: String,
}

impl GatewayEvent for MemberLeaveEvent {}

/// A full member-list snapshot for a server, used to reconcile which
/// members are still present.
pub struct SyncMembersEvent {
    pub server_id: String,
    pub present_user_ids: Vec<String>,
}

impl GatewayEvent for SyncMembersEvent {}

/// Ask the gateway collaborator to backfill message history for a
/// channel, e.g. because this is the first time the archive has seen it.
pub struct RequestChannelHistory {
    pub channel_id: String,
    pub before_message_id: Option<String>,
}

impl GatewayCommand for RequestChannelHistory {
    type Response = Vec<String>;
}

/// Ask the gateway collaborator for a fresh, complete member list for a
/// server, used to drive `SyncMembersEvent`.
pub struct RequestMemberList {
    pub server_id: String,
}

impl GatewayCommand for RequestMemberList {
    type Response = Vec<String>;
}
