//! Bridge contract interfaces.
//!
//! Only the events observed and the functions called by the relayer are declared.

#![allow(missing_docs)]

use alloy_sol_types::sol;

sol! {
    /// Vault that locks the native token on the source chain and releases it back.
    #[derive(Debug)]
    interface TokenVault {
        event TokensLockedV2(
            address indexed user,
            address destToken,
            address recipient,
            uint256 amount,
            uint256 nonce,
            uint256 destChainId,
            bytes32 transferId
        );

        function releaseV2(address user, uint256 amount, uint256 srcChainId, bytes32 transferId) external;
    }

    /// Wrapped token (wMRT) minted on destination chains.
    #[derive(Debug)]
    interface WrappedToken {
        event TokensBurned(address indexed user, uint256 amount, bytes32 transferId);

        function mintWrapped(address to, uint256 amount, bytes32 transferId) external;
    }

    /// Vault that locks NFTs on the source chain and releases them back.
    #[derive(Debug)]
    interface NftVault {
        event NFTLocked(
            bytes32 indexed transferId,
            address indexed nftAddress,
            uint256 tokenId,
            address sender,
            address recipient,
            uint256 destChainId,
            string uri,
            string name,
            string symbol
        );

        function releaseNFT(address collection, uint256 tokenId, address to, bytes32 transferId) external;
    }

    /// Wrapped NFT collection minted on destination chains.
    #[derive(Debug)]
    interface WrappedNft {
        event NFTBurned(
            bytes32 indexed transferId,
            address indexed sender,
            uint256 tokenId,
            address originalCollection,
            string uri
        );

        function mintWrapped(address to, uint256 tokenId, string uri, bytes32 transferId) external;
    }
}
