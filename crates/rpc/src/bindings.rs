//! Contract surface consumed by the driver.

use alloy_sol_types::sol;

sol! {
    /// L1 rollup inbox.
    interface IInbox {
        struct BlockMetadata {
            bytes32 l1Hash;
            bytes32 difficulty;
            bytes32 blobHash;
            bytes32 txListHash;
            bytes32 extraData;
            address coinbase;
            uint64 id;
            uint32 gasLimit;
            uint64 timestamp;
            uint64 l1Height;
            uint32 txListByteOffset;
            uint32 txListByteSize;
            bool blobUsed;
            bytes32 parentMetaHash;
        }

        struct SlotA {
            uint64 genesisHeight;
            uint64 genesisTimestamp;
        }

        struct SlotB {
            uint64 numBlocks;
            uint64 lastVerifiedBlockId;
            bool provingPaused;
        }

        struct Config {
            uint64 chainId;
            uint64 blockMaxProposals;
            uint64 blockRingBufferSize;
            uint32 blockMaxGasLimit;
            uint64 blockMaxTxListBytes;
        }

        struct Block {
            bytes32 metaHash;
            address assignedProver;
            uint64 blockId;
            uint64 proposedAt;
            uint64 proposedIn;
            uint32 nextTransitionId;
            uint32 verifiedTransitionId;
        }

        event BlockProposed(
            uint256 indexed blockId,
            address indexed assignedProver,
            uint96 livenessBond,
            BlockMetadata meta
        );

        function proposeBlock(bytes params, bytes txList) external payable returns (BlockMetadata meta);

        function getStateVariables() external view returns (SlotA memory a, SlotB memory b);

        function getConfig() external view returns (Config memory config);

        function getBlock(uint64 blockId) external view returns (Block memory blk);
    }

    /// L2 anchor contract, called by the first transaction of every block.
    interface ITaikoL2 {
        function anchor(bytes32 l1Hash, bytes32 l1StateRoot, uint64 l1Height, uint32 parentGasUsed) external;

        function getBasefee(uint64 l1Height, uint32 parentGasUsed) external view returns (uint256 basefee);
    }
}

pub use ITaikoL2::anchorCall;
