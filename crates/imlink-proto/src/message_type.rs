use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Every message type the client understands.
///
/// The wire carries the type as a plain `int32`; values this enum does not know decode
/// fine and are reported as `None` by [`crate::Header::message_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Hello,
    HeartBeat,
    Delivered,
    Chat,
    ChatRead,
    GroupChat,
    GroupChatRead,
    StatusReq,
    StatusSync,
    StatusRes,
    At,
    Revoke,
    Delete,
    SysGroupCreate,
    SysGroupAddMember,
    SysGroupDelMember,
    SysGroupSetAdmin,
    SysGroupCancelAdmin,
    SysGroupSetAllMuted,
    SysGroupCancelAllMuted,
    SysGroupSetJoinApproval,
    SysGroupCancelJoinApproval,
    SysGroupSetHistoryBrowse,
    SysGroupCancelHistoryBrowse,
    SysGroupOwnerTransfer,
    SysGroupUpdateMemberMuted,
    SysGroupLeave,
    SysGroupDrop,
    SysGroupUpdateAnnouncement,
    SysGroupUpdateName,
    SysGroupUpdateAvatar,
}

impl MessageType {
    /// Every known type, in wire-value order.
    pub const ALL: [MessageType; 31] = [
        MessageType::Hello,
        MessageType::HeartBeat,
        MessageType::Delivered,
        MessageType::Chat,
        MessageType::ChatRead,
        MessageType::GroupChat,
        MessageType::GroupChatRead,
        MessageType::StatusReq,
        MessageType::StatusSync,
        MessageType::StatusRes,
        MessageType::At,
        MessageType::Revoke,
        MessageType::Delete,
        MessageType::SysGroupCreate,
        MessageType::SysGroupAddMember,
        MessageType::SysGroupDelMember,
        MessageType::SysGroupSetAdmin,
        MessageType::SysGroupCancelAdmin,
        MessageType::SysGroupSetAllMuted,
        MessageType::SysGroupCancelAllMuted,
        MessageType::SysGroupSetJoinApproval,
        MessageType::SysGroupCancelJoinApproval,
        MessageType::SysGroupSetHistoryBrowse,
        MessageType::SysGroupCancelHistoryBrowse,
        MessageType::SysGroupOwnerTransfer,
        MessageType::SysGroupUpdateMemberMuted,
        MessageType::SysGroupLeave,
        MessageType::SysGroupDrop,
        MessageType::SysGroupUpdateAnnouncement,
        MessageType::SysGroupUpdateName,
        MessageType::SysGroupUpdateAvatar,
    ];

    /// Administrative group notifications, all routed to one group-system handler.
    pub const GROUP_SYSTEM: [MessageType; 18] = [
        MessageType::SysGroupCreate,
        MessageType::SysGroupAddMember,
        MessageType::SysGroupDelMember,
        MessageType::SysGroupSetAdmin,
        MessageType::SysGroupCancelAdmin,
        MessageType::SysGroupSetAllMuted,
        MessageType::SysGroupCancelAllMuted,
        MessageType::SysGroupSetJoinApproval,
        MessageType::SysGroupCancelJoinApproval,
        MessageType::SysGroupSetHistoryBrowse,
        MessageType::SysGroupCancelHistoryBrowse,
        MessageType::SysGroupOwnerTransfer,
        MessageType::SysGroupUpdateMemberMuted,
        MessageType::SysGroupLeave,
        MessageType::SysGroupDrop,
        MessageType::SysGroupUpdateAnnouncement,
        MessageType::SysGroupUpdateName,
        MessageType::SysGroupUpdateAvatar,
    ];

    /// Wire value of this type.
    pub fn as_i32(self) -> i32 {
        match self {
            MessageType::Hello => 0,
            MessageType::HeartBeat => 1,
            MessageType::Delivered => 2,
            MessageType::Chat => 3,
            MessageType::ChatRead => 4,
            MessageType::GroupChat => 5,
            MessageType::GroupChatRead => 6,
            MessageType::StatusReq => 7,
            MessageType::StatusSync => 8,
            MessageType::StatusRes => 9,
            MessageType::At => 10,
            MessageType::Revoke => 11,
            MessageType::Delete => 12,
            MessageType::SysGroupCreate => 100,
            MessageType::SysGroupAddMember => 101,
            MessageType::SysGroupDelMember => 102,
            MessageType::SysGroupSetAdmin => 103,
            MessageType::SysGroupCancelAdmin => 104,
            MessageType::SysGroupSetAllMuted => 105,
            MessageType::SysGroupCancelAllMuted => 106,
            MessageType::SysGroupSetJoinApproval => 107,
            MessageType::SysGroupCancelJoinApproval => 108,
            MessageType::SysGroupSetHistoryBrowse => 109,
            MessageType::SysGroupCancelHistoryBrowse => 110,
            MessageType::SysGroupOwnerTransfer => 111,
            MessageType::SysGroupUpdateMemberMuted => 112,
            MessageType::SysGroupLeave => 113,
            MessageType::SysGroupDrop => 114,
            MessageType::SysGroupUpdateAnnouncement => 115,
            MessageType::SysGroupUpdateName => 116,
            MessageType::SysGroupUpdateAvatar => 117,
        }
    }

    /// Look up a wire value; `None` for types added after this client was built.
    pub fn from_i32(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| ty.as_i32() == value)
    }

    /// Protocol name, e.g. `HEART_BEAT`.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Hello => "HELLO",
            MessageType::HeartBeat => "HEART_BEAT",
            MessageType::Delivered => "DELIVERED",
            MessageType::Chat => "CHAT",
            MessageType::ChatRead => "CHAT_READ",
            MessageType::GroupChat => "GROUP_CHAT",
            MessageType::GroupChatRead => "GROUP_CHAT_READ",
            MessageType::StatusReq => "STATUS_REQ",
            MessageType::StatusSync => "STATUS_SYNC",
            MessageType::StatusRes => "STATUS_RES",
            MessageType::At => "AT",
            MessageType::Revoke => "REVOKE",
            MessageType::Delete => "DELETE",
            MessageType::SysGroupCreate => "SYS_GROUP_CREATE",
            MessageType::SysGroupAddMember => "SYS_GROUP_ADD_MEMBER",
            MessageType::SysGroupDelMember => "SYS_GROUP_DEL_MEMBER",
            MessageType::SysGroupSetAdmin => "SYS_GROUP_SET_ADMIN",
            MessageType::SysGroupCancelAdmin => "SYS_GROUP_CANCEL_ADMIN",
            MessageType::SysGroupSetAllMuted => "SYS_GROUP_SET_ALL_MUTED",
            MessageType::SysGroupCancelAllMuted => "SYS_GROUP_CANCEL_ALL_MUTED",
            MessageType::SysGroupSetJoinApproval => "SYS_GROUP_SET_JOIN_APPROVAL",
            MessageType::SysGroupCancelJoinApproval => "SYS_GROUP_CANCEL_JOIN_APPROVAL",
            MessageType::SysGroupSetHistoryBrowse => "SYS_GROUP_SET_HISTORY_BROWSE",
            MessageType::SysGroupCancelHistoryBrowse => "SYS_GROUP_CANCEL_HISTORY_BROWSE",
            MessageType::SysGroupOwnerTransfer => "SYS_GROUP_OWNER_TRANSFER",
            MessageType::SysGroupUpdateMemberMuted => "SYS_GROUP_UPDATE_MEMBER_MUTED",
            MessageType::SysGroupLeave => "SYS_GROUP_LEAVE",
            MessageType::SysGroupDrop => "SYS_GROUP_DROP",
            MessageType::SysGroupUpdateAnnouncement => "SYS_GROUP_UPDATE_ANNOUNCEMENT",
            MessageType::SysGroupUpdateName => "SYS_GROUP_UPDATE_NAME",
            MessageType::SysGroupUpdateAvatar => "SYS_GROUP_UPDATE_AVATAR",
        }
    }

    /// Commands carry no body.
    pub fn is_command(self) -> bool {
        matches!(self, MessageType::Hello | MessageType::HeartBeat)
    }

    pub fn is_group_system(self) -> bool {
        Self::GROUP_SYSTEM.contains(&self)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str() == wanted)
            .ok_or_else(|| format!("unknown message type '{s}'"))
    }
}
