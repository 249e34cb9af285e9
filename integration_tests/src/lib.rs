pub mod mock_bus;
