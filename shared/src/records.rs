//! Monitor records queued by the driver and drained through `IOCTL_READ_DATA`.
//!
//! The messages are plain prost types, so the same definitions encode inside
//! the driver and decode in user mode. `DataType` values are part of the wire
//! contract with existing clients; the gaps between ranges delimit each
//! category.

use crate::constants::{CATEGORY_FILE, CATEGORY_NETWORK, CATEGORY_PROCESS, CATEGORY_REGISTRY};

/// Kind of monitored operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Unspecified = 0,

    ProcessCreate = 2,
    ProcessExit = 3,

    RegistryCreateKey = 6,
    RegistryCreateKeyEx = 7,
    RegistryDeleteKey = 8,
    RegistrySetValueKey = 9,
    RegistryDeleteValueKey = 10,
    RegistryQueryKey = 11,
    RegistryQueryValueKey = 12,
    RegistryOpenKey = 13,
    RegistryOpenKeyEx = 14,

    FileCreate = 17,
    FileCreateDir = 18,
    FileWrite = 19,
    FileRead = 20,
    FileSetInformation = 21,
    FileDelete = 22,
    FileRename = 23,
    FileOpen = 24,
    FileOpenDir = 25,
    FileClose = 26,

    NetConnect = 29,
    NetBind = 30,
    NetDns = 31,
}

/// Coarse grouping used by the driver's category filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Process,
    Registry,
    File,
    Network,
}

impl Category {
    /// Bit of this category in the `IOCTL_WRITE_DATA` mask.
    pub const fn mask(self) -> u32 {
        match self {
            Category::Process => CATEGORY_PROCESS,
            Category::Registry => CATEGORY_REGISTRY,
            Category::File => CATEGORY_FILE,
            Category::Network => CATEGORY_NETWORK,
        }
    }
}

impl DataType {
    /// Category by value range, mirroring the `*_START`/`*_END` markers.
    pub const fn category(self) -> Option<Category> {
        match self as i32 {
            2..=3 => Some(Category::Process),
            6..=14 => Some(Category::Registry),
            17..=26 => Some(Category::File),
            29..=31 => Some(Category::Network),
            _ => None,
        }
    }
}

/// Envelope for every record the driver hands to user mode.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MonitorRecord {
    #[prost(message, optional, tag = "1")]
    pub ts: ::core::option::Option<::prost_types::Timestamp>,
    #[prost(enumeration = "DataType", tag = "2")]
    pub kind: i32,
    #[prost(uint32, tag = "3")]
    pub pid: u32,
    #[prost(oneof = "monitor_record::Payload", tags = "4, 5, 6, 7")]
    pub payload: ::core::option::Option<monitor_record::Payload>,
}

pub mod monitor_record {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "4")]
        Process(super::ProcessData),
        #[prost(message, tag = "5")]
        Registry(super::RegistryData),
        #[prost(message, tag = "6")]
        File(super::FileData),
        #[prost(message, tag = "7")]
        Network(super::NetworkData),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProcessData {
    #[prost(uint32, tag = "1")]
    pub parent_pid: u32,
    #[prost(string, tag = "2")]
    pub image_path: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub cmdline: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub parent_image_path: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegistryData {
    /// Registry value type, or one of the query-class codes (20+).
    #[prost(uint32, tag = "1")]
    pub value_type: u32,
    #[prost(string, tag = "2")]
    pub key_path: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub value_name: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "4")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileData {
    #[prost(uint32, tag = "1")]
    pub attributes: u32,
    /// `FILE_INFORMATION_CLASS` for set-information records.
    #[prost(uint32, tag = "2")]
    pub info_class: u32,
    #[prost(string, tag = "3")]
    pub path: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "4")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NetworkData {
    #[prost(uint32, tag = "1")]
    pub direction: u32,
    /// IPPROTO value (6 = TCP, 17 = UDP).
    #[prost(uint32, tag = "2")]
    pub protocol: u32,
    #[prost(uint32, tag = "3")]
    pub src_ip: u32,
    #[prost(uint32, tag = "4")]
    pub src_port: u32,
    #[prost(uint32, tag = "5")]
    pub dst_ip: u32,
    #[prost(uint32, tag = "6")]
    pub dst_port: u32,
    #[prost(bytes = "vec", tag = "7")]
    pub data: ::prost::alloc::vec::Vec<u8>,
}

impl MonitorRecord {
    /// Category of the record, `None` for unknown or unspecified kinds.
    pub fn category(&self) -> Option<Category> {
        DataType::try_from(self.kind).ok().and_then(DataType::category)
    }
}
