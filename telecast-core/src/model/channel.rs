//! Channel identity and metadata.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broadcast network kind, derived from the ARIB network id during EPG
/// refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    Gr,
    Bs,
    Cs,
    Catv,
    Sky,
    Bs4k,
    Stardigio,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelType::Gr => "gr",
            ChannelType::Bs => "bs",
            ChannelType::Cs => "cs",
            ChannelType::Catv => "catv",
            ChannelType::Sky => "sky",
            ChannelType::Bs4k => "bs4k",
            ChannelType::Stardigio => "stardigio",
        };
        f.write_str(s)
    }
}

impl ChannelType {
    /// Maps an ARIB network id to a channel type.
    pub fn from_network_id(network_id: u16) -> ChannelType {
        match network_id {
            4 => ChannelType::Bs,
            3 | 6 | 7 | 10 => ChannelType::Cs,
            n if n >= 0x7880 => ChannelType::Gr,
            _ => ChannelType::Catv,
        }
    }
}

/// Channel identity: `(network_id, service_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub network_id: u16,
    pub service_id: u16,
}

/// Channel metadata, rebuilt wholesale on every EPG refresh and never
/// mutated per-client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub transport_stream_id: Option<u16>,
    pub remocon_id: u8,
    /// 3-digit channel number, with an optional `-N` disambiguator for
    /// services sharing a remocon id.
    pub channel_number: String,
    pub channel_type: ChannelType,
    pub name: String,
    pub is_subchannel: bool,
    pub is_radiochannel: bool,
    pub is_watchable: bool,
}

impl Channel {
    /// `lower(type) || channel_number`, e.g. `gr011`.
    pub fn display_channel_id(&self) -> String {
        format!("{}{}", self.channel_type, self.channel_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_id_maps_to_channel_type() {
        assert_eq!(ChannelType::from_network_id(4), ChannelType::Bs);
        assert_eq!(ChannelType::from_network_id(3), ChannelType::Cs);
        assert_eq!(ChannelType::from_network_id(7), ChannelType::Cs);
        assert_eq!(ChannelType::from_network_id(0x7fe1), ChannelType::Gr);
        assert_eq!(ChannelType::from_network_id(1), ChannelType::Catv);
    }

    #[test]
    fn display_channel_id_is_lowercase_type_plus_number() {
        let ch = Channel {
            id: ChannelId { network_id: 0x7fe1, service_id: 1024 },
            transport_stream_id: Some(1),
            remocon_id: 1,
            channel_number: "011".to_string(),
            channel_type: ChannelType::Gr,
            name: "Example TV".to_string(),
            is_subchannel: false,
            is_radiochannel: false,
            is_watchable: true,
        };
        assert_eq!(ch.display_channel_id(), "gr011");
    }
}
