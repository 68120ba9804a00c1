// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node Component Taxonomy
//!
//! Hardware attached to a requested node. Network interfaces may only bind
//! to NIC-class components.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Component model names as understood by the federation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentModel {
    /// Shared virtual function on a site NIC
    #[serde(rename = "NIC_Basic")]
    NicBasic,
    /// Dedicated ConnectX-5 card
    #[serde(rename = "NIC_ConnectX_5")]
    NicConnectX5,
    /// Dedicated ConnectX-6 card
    #[serde(rename = "NIC_ConnectX_6")]
    NicConnectX6,
    /// Programmable NIC
    #[serde(rename = "SmartNIC")]
    SmartNic,
    #[serde(rename = "GPU_TeslaT4")]
    GpuTeslaT4,
    #[serde(rename = "GPU_RTX6000")]
    GpuRtx6000,
    #[serde(rename = "GPU_A30")]
    GpuA30,
    #[serde(rename = "NVME_P4510")]
    NvmeP4510,
}

impl ComponentModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NicBasic => "NIC_Basic",
            Self::NicConnectX5 => "NIC_ConnectX_5",
            Self::NicConnectX6 => "NIC_ConnectX_6",
            Self::SmartNic => "SmartNIC",
            Self::GpuTeslaT4 => "GPU_TeslaT4",
            Self::GpuRtx6000 => "GPU_RTX6000",
            Self::GpuA30 => "GPU_A30",
            Self::NvmeP4510 => "NVME_P4510",
        }
    }

    /// Whether dataplane interfaces can attach through this component
    pub fn is_nic(&self) -> bool {
        matches!(
            self,
            Self::NicBasic | Self::NicConnectX5 | Self::NicConnectX6 | Self::SmartNic
        )
    }
}

impl fmt::Display for ComponentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
