//! Protobuf wire messages. Kept private; the public API speaks [`crate::Envelope`].

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WireMsg {
    #[prost(message, optional, tag = "1")]
    pub header: Option<WireHeader>,
    #[prost(message, optional, tag = "2")]
    pub body: Option<WireBody>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WireHeader {
    #[prost(uint32, tag = "1")]
    pub magic: u32,
    #[prost(uint32, tag = "2")]
    pub version: u32,
    #[prost(int32, tag = "3")]
    pub msg_type: i32,
    #[prost(bool, tag = "4")]
    pub is_extension: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct WireBody {
    #[prost(string, tag = "1")]
    pub from_id: String,
    #[prost(string, tag = "2")]
    pub from_client: String,
    #[prost(string, optional, tag = "3")]
    pub to_id: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub group_id: Option<String>,
    #[prost(uint64, optional, tag = "5")]
    pub msg_id: Option<u64>,
    #[prost(string, optional, tag = "6")]
    pub session_id: Option<String>,
    #[prost(string, tag = "7")]
    pub content: String,
    #[prost(uint32, optional, tag = "8")]
    pub content_type: Option<u32>,
    #[prost(string, optional, tag = "9")]
    pub seq: Option<String>,
}
