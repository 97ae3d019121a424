/// ABI of the service-registry contract.
///
/// Only the calls and the event this crate consumes are declared.
use alloy::sol;

sol! {
    interface IServiceRegistry {
        struct Service {
            uint256 id;
            string vehicleId;
            uint256 mileage;
            uint256 cost;
            string description;
            string serviceType;
            address serviceProvider;
            uint256 timestamp;
            bool verified;
        }

        event ServiceRegistered(
            uint256 indexed serviceId,
            string vehicleId,
            address indexed serviceProvider,
            uint256 timestamp,
            uint256 cost
        );

        function registerService(
            string vehicleId,
            uint256 mileage,
            uint256 cost,
            string description,
            string serviceType
        ) external returns (uint256 serviceId);

        function registerHash(bytes32 hash) external;

        function hashExists(bytes32 hash) external view returns (bool exists);

        function getService(uint256 serviceId) external view returns (Service memory service);

        function getStats() external view returns (uint256 total, uint256 verified, uint256 balance);

        function getRegisteredHashesCount() external view returns (uint256 count);
    }
}
