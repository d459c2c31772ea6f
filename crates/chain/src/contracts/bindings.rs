//! Contract bindings for the Chromatic protocol.
//!
//! The protocol contracts live in their own repository; only the subset of
//! their ABI that the deploy scripts, tasks, REPL and indexer touch is
//! declared here.
//!
//! # Usage
//!
//! ```rust,ignore
//! use chromatic_chain::contracts::bindings::IChromaticMarketFactory;
//!
//! let factory = IChromaticMarketFactory::new(address, client.provider());
//! let markets = factory.getMarkets().call().await?._0;
//! ```

use alloy::sol;

// Structs and interfaces share one `sol!` invocation so the interfaces can
// name the structs.
sol! {
    // Shared structs

    #[derive(Debug, PartialEq, Eq)]
    struct OracleProviderProperties {
        uint32 minTakeProfitBPS;
        uint32 maxTakeProfitBPS;
        uint8 leverageLevel;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct InterestRateRecord {
        uint256 annualRateBPS;
        uint256 beginTimestamp;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct BinMargin {
        uint16 tradingFeeRate;
        uint256 amount;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct Position {
        uint256 id;
        uint256 openVersion;
        uint256 closeVersion;
        int256 qty;
        uint256 openTimestamp;
        uint256 closeTimestamp;
        uint256 takerMargin;
        address owner;
        BinMargin[] _binMargins;
        uint8 _feeProtocol;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct LpReceipt {
        uint256 id;
        uint256 oracleVersion;
        uint256 amount;
        address recipient;
        uint8 action;
        int16 tradingFeeRate;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct LiquidityBinStatus {
        uint256 liquidity;
        uint256 freeLiquidity;
        uint256 binValue;
        int16 tradingFeeRate;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct OracleVersion {
        uint256 version;
        uint256 timestamp;
        int256 price;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct FacetCut {
        address facetAddress;
        uint8 action;
        bytes4[] functionSelectors;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct LoupeFacet {
        address facetAddress;
        bytes4[] functionSelectors;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct CLBBalance {
        uint256 tokenId;
        uint256 balance;
        uint256 totalSupply;
        uint256 binValue;
    }

    #[derive(Debug, PartialEq, Eq)]
    struct ExactInputSingleParams {
        address tokenIn;
        address tokenOut;
        uint24 fee;
        address recipient;
        uint256 deadline;
        uint256 amountIn;
        uint256 amountOutMinimum;
        uint160 sqrtPriceLimitX96;
    }

    // Core

    #[sol(rpc)]
    #[derive(Debug)]
    interface IChromaticMarketFactory {
        event MarketCreated(address indexed oracleProvider, address indexed settlementToken, address indexed market);
        event OracleProviderRegistered(address indexed oracleProvider, OracleProviderProperties properties);
        event UpdateTakeProfitBPSRange(address indexed oracleProvider, uint32 indexed minTakeProfitBPS, uint32 indexed maxTakeProfitBPS);
        event UpdateLeverageLevel(address indexed oracleProvider, uint8 indexed level);
        event SettlementTokenRegistered(
            address indexed token,
            address indexed oracleProvider,
            uint256 minimumMargin,
            uint256 interestRate,
            uint256 flashLoanFeeRate,
            uint256 earningDistributionThreshold,
            uint24 uniswapFeeTier
        );
        event InterestRateRecordAppended(address indexed token, uint256 indexed annualRateBPS, uint256 indexed beginTimestamp);
        event LastInterestRateRecordRemoved(address indexed token, uint256 indexed annualRateBPS, uint256 indexed beginTimestamp);

        function dao() external view returns (address);
        function treasury() external view returns (address);
        function liquidator() external view returns (address);
        function vault() external view returns (address);
        function keeperFeePayer() external view returns (address);
        function marketSettlement() external view returns (address);

        function updateDao(address dao) external;
        function updateTreasury(address treasury) external;
        function setLiquidator(address liquidator) external;
        function setVault(address vault) external;
        function setKeeperFeePayer(address keeperFeePayer) external;
        function setMarketSettlement(address marketSettlement) external;

        function registeredOracleProviders() external view returns (address[] memory);
        function isRegisteredOracleProvider(address oracleProvider) external view returns (bool);
        function registerOracleProvider(address oracleProvider, OracleProviderProperties memory properties) external;
        function unregisterOracleProvider(address oracleProvider) external;
        function getOracleProviderProperties(address oracleProvider) external view returns (OracleProviderProperties memory);
        function updateTakeProfitBPSRange(address oracleProvider, uint32 minTakeProfitBPS, uint32 maxTakeProfitBPS) external;
        function updateLeverageLevel(address oracleProvider, uint8 level) external;

        function registeredSettlementTokens() external view returns (address[] memory);
        function isRegisteredSettlementToken(address token) external view returns (bool);
        function registerSettlementToken(
            address token,
            address oracleProvider,
            uint256 minimumMargin,
            uint256 interestRate,
            uint256 flashLoanFeeRate,
            uint256 earningDistributionThreshold,
            uint24 uniswapFeeTier
        ) external;
        function getMinimumMargin(address token) external view returns (uint256);
        function setMinimumMargin(address token, uint256 minimumMargin) external;
        function getFlashLoanFeeRate(address token) external view returns (uint256);
        function setFlashLoanFeeRate(address token, uint256 flashLoanFeeRate) external;
        function getEarningDistributionThreshold(address token) external view returns (uint256);
        function setEarningDistributionThreshold(address token, uint256 threshold) external;
        function getUniswapFeeTier(address token) external view returns (uint24);
        function setUniswapFeeTier(address token, uint24 uniswapFeeTier) external;
        function getSettlementTokenOracleProvider(address token) external view returns (address);
        function appendInterestRateRecord(address token, uint256 annualRateBPS, uint256 beginTimestamp) external;
        function getInterestRateRecords(address token) external view returns (InterestRateRecord[] memory);
        function currentInterestRate(address token) external view returns (uint256);

        function getMarkets() external view returns (address[] memory);
        function getMarketsBySettlmentToken(address settlementToken) external view returns (address[] memory);
        function getMarket(address oracleProvider, address settlementToken) external view returns (address);
        function isRegisteredMarket(address market) external view returns (bool);
        function createMarket(address oracleProvider, address settlementToken) external;
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IChromaticMarket {
        event OpenPosition(address indexed account, Position position);
        event ClosePosition(address indexed account, Position position);
        event ClaimPosition(address indexed account, int256 indexed pnl, uint256 indexed interest, Position position);
        event Liquidate(address indexed account, int256 indexed pnl, uint256 indexed interest, uint256 usedKeeperFee, Position position);
        event AddLiquidity(LpReceipt receipt);
        event ClaimLiquidity(LpReceipt receipt, uint256 indexed clbTokenAmount);
        event RemoveLiquidity(LpReceipt receipt);
        event WithdrawLiquidity(LpReceipt receipt, uint256 indexed amount, uint256 indexed burnedCLBTokenAmount);

        function factory() external view returns (address);
        function settlementToken() external view returns (address);
        function oracleProvider() external view returns (address);
        function clbToken() external view returns (address);
        function liquidator() external view returns (address);
        function vault() external view returns (address);

        function getPositions(uint256[] calldata positionIds) external view returns (Position[] memory);
        function getLpReceipts(uint256[] calldata receiptIds) external view returns (LpReceipt[] memory);
        function liquidityBinStatuses() external view returns (LiquidityBinStatus[] memory);
        function getBinValues(int16[] calldata tradingFeeRates) external view returns (uint256[] memory);

        function checkLiquidation(uint256 positionId) external view returns (bool);
        function checkClaimPosition(uint256 positionId) external view returns (bool);
        function liquidate(uint256 positionId, address keeper, uint256 keeperFee) external;
        function claimPosition(uint256 positionId, address keeper, uint256 keeperFee) external;
        function settle() external;
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IChromaticVault {
        function earningDistributor() external view returns (address);
        function makerBalances(address token) external view returns (uint256);
        function takerBalances(address token) external view returns (uint256);
        function pendingMakerEarnings(address token) external view returns (uint256);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IVaultEarningDistributor {
        function automate() external view returns (address);
        function makerEarningDistributionTaskIds(address token) external view returns (bytes32);
        function marketEarningDistributionTaskIds(address market) external view returns (bytes32);
        function createMakerEarningDistributionTask(address token) external;
        function cancelMakerEarningDistributionTask(address token) external;
        function createMarketEarningDistributionTask(address market) external;
        function cancelMarketEarningDistributionTask(address market) external;
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IMarketSettlement {
        function automate() external view returns (address);
        function settlementTaskIds(address market) external view returns (bytes32);
        function createSettlementTask(address market) external;
        function cancelSettlementTask(address market) external;
        function withdrawTaskFunds(uint256 amount) external;
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IChromaticLiquidator {
        function liquidate(address market, uint256 positionId) external;
        function claimPosition(address market, uint256 positionId) external;
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface ICLBToken {
        event TransferSingle(address indexed operator, address indexed from, address indexed to, uint256 id, uint256 value);
        event TransferBatch(address indexed operator, address indexed from, address indexed to, uint256[] ids, uint256[] values);

        function totalSupply(uint256 id) external view returns (uint256);
        function totalSupplyBatch(uint256[] calldata ids) external view returns (uint256[] memory);
        function balanceOf(address account, uint256 id) external view returns (uint256);
        function setApprovalForAll(address operator, bool approved) external;
        function isApprovedForAll(address account, address operator) external view returns (bool);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IOracleProvider {
        function currentVersion() external view returns (OracleVersion memory);
        function atVersion(uint256 version) external view returns (OracleVersion memory);
        function description() external view returns (string memory);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IOracleProviderMock {
        function increaseVersion(int256 price) external;
    }

    // Diamond

    #[sol(rpc)]
    #[derive(Debug)]
    interface IDiamondLoupe {
        function facets() external view returns (LoupeFacet[] memory);
        function facetFunctionSelectors(address facet) external view returns (bytes4[] memory);
        function facetAddresses() external view returns (address[] memory);
        function facetAddress(bytes4 functionSelector) external view returns (address);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IDiamondCut {
        function diamondCut(FacetCut[] calldata cuts, address init, bytes calldata data) external;
    }

    // Periphery

    #[sol(rpc)]
    #[derive(Debug)]
    interface IChromaticRouter {
        function createAccount() external;
        function getAccount() external view returns (address);
        function openPosition(
            address market,
            int256 qty,
            uint256 takerMargin,
            uint256 makerMargin,
            uint256 maxAllowableTradingFee
        ) external;
        function closePosition(address market, uint256 positionId) external;
        function claimPosition(address market, uint256 positionId) external;
        function getPositionIds(address market) external view returns (uint256[] memory);

        function addLiquidity(address market, int16 feeRate, uint256 amount, address recipient) external;
        function claimLiquidity(address market, uint256 receiptId) external;
        function removeLiquidity(address market, int16 feeRate, uint256 clbTokenAmount, address recipient) external;
        function withdrawLiquidity(address market, uint256 receiptId) external;
        function addLiquidityBatch(address market, address recipient, int16[] calldata feeRates, uint256[] calldata amounts) external;
        function claimLiquidityBatch(address market, uint256[] calldata receiptIds) external;
        function removeLiquidityBatch(address market, address recipient, int16[] calldata feeRates, uint256[] calldata clbTokenAmounts) external;
        function withdrawLiquidityBatch(address market, uint256[] calldata receiptIds) external;
        function getLpReceiptIds(address market) external view returns (uint256[] memory);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IChromaticLens {
        function clbBalanceOf(address market, address owner) external view returns (CLBBalance[] memory);
        function liquidityBinStatuses(address market) external view returns (LiquidityBinStatus[] memory);
    }

    // External: automation, tokens, swaps

    #[sol(rpc)]
    #[derive(Debug)]
    interface IAutomate {
        function taskTreasury() external view returns (address);
        function getTaskIdsByUser(address taskCreator) external view returns (bytes32[] memory);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface ITaskTreasury {
        function userTokenBalance(address user, address token) external view returns (uint256);
        function depositFunds(address receiver, address token, uint256 amount) external payable;
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IWETH9 {
        function deposit() external payable;
        function withdraw(uint256 amount) external;
        function balanceOf(address account) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface ISwapRouter {
        function exactInputSingle(ExactInputSingleParams calldata params) external payable returns (uint256);
    }

    #[sol(rpc)]
    #[derive(Debug)]
    interface IFixedPriceSwapRouter {
        function ethPrice(address token) external view returns (uint256);
        function setEthPrice(address token, uint256 price) external;
        function addWhitelistedClient(address client) external;
        function removeWhitelistedClient(address client) external;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use alloy::sol_types::{SolCall, SolEvent};

    #[test]
    fn test_diamond_cut_selector() {
        // diamondCut((address,uint8,bytes4[])[],address,bytes) is fixed by EIP-2535
        assert_eq!(hex::encode(IDiamondCut::diamondCutCall::SELECTOR), "1f931c1c");
    }

    #[test]
    fn test_loupe_selectors() {
        assert_eq!(hex::encode(IDiamondLoupe::facetsCall::SELECTOR), "7a0ed627");
        assert_eq!(hex::encode(IDiamondLoupe::facetAddressCall::SELECTOR), "cdffacc6");
        assert_eq!(
            hex::encode(IDiamondLoupe::facetFunctionSelectorsCall::SELECTOR),
            "adfca15e"
        );
    }

    #[test]
    fn test_erc1155_transfer_single_topic() {
        assert_eq!(
            hex::encode(ICLBToken::TransferSingle::SIGNATURE_HASH),
            "c3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62"
        );
    }

    #[test]
    fn test_interfaces_take_shared_structs() {
        let cut = FacetCut {
            facetAddress: Address::repeat_byte(1),
            action: 1,
            functionSelectors: vec![IDiamondCut::diamondCutCall::SELECTOR.into()],
        };
        let call = IDiamondCut::diamondCutCall {
            cuts: vec![cut.clone()],
            init: Address::ZERO,
            data: Default::default(),
        };
        let decoded = IDiamondCut::diamondCutCall::abi_decode(&call.abi_encode(), true).unwrap();
        assert_eq!(decoded.cuts, vec![cut]);

        // OpenPosition carries the shared Position tuple
        assert_eq!(
            IChromaticMarket::OpenPosition::SIGNATURE,
            "OpenPosition(address,(uint256,uint256,uint256,int256,uint256,uint256,uint256,address,(uint16,uint256)[],uint8))"
        );
    }

    #[test]
    fn test_register_settlement_token_encodes() {
        let call = IChromaticMarketFactory::registerSettlementTokenCall {
            token: Address::ZERO,
            oracleProvider: Address::ZERO,
            minimumMargin: U256::from(10u64),
            interestRate: U256::from(1000u64),
            flashLoanFeeRate: U256::from(5000u64),
            earningDistributionThreshold: U256::from(1u64),
            uniswapFeeTier: alloy::primitives::aliases::U24::from(3000u32),
        };
        // selector + 7 static words
        assert_eq!(call.abi_encode().len(), 4 + 7 * 32);
    }
}
