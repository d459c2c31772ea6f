//! Common contract interfaces and helpers shared across the workspace.

use alloy::primitives::{address, keccak256, Address, FixedBytes};
use alloy::sol;

// ERC20 interface for settlement tokens and WETH
sol! {
    /// Standard ERC20 interface (with metadata)
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
    }
}

/// Token address used by automation treasuries to denote native ETH.
pub const ETH_SENTINEL: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Diamond cut action, mirrors `IDiamondCut.FacetCutAction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum FacetCutAction {
    Add = 0,
    Replace = 1,
    Remove = 2,
}

impl FacetCutAction {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Compute a 4-byte function selector from a canonical signature,
/// e.g. `selector("closePosition(uint256)")`.
pub fn selector(signature: &str) -> FixedBytes<4> {
    let hash = keccak256(signature.as_bytes());
    FixedBytes::from_slice(&hash[..4])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_transfer() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
    }

    #[test]
    fn test_facet_cut_action_values() {
        assert_eq!(FacetCutAction::Add.as_u8(), 0);
        assert_eq!(FacetCutAction::Replace.as_u8(), 1);
        assert_eq!(FacetCutAction::Remove.as_u8(), 2);
    }

    #[test]
    fn test_eth_sentinel_is_not_zero() {
        assert!(!ETH_SENTINEL.is_zero());
    }
}
