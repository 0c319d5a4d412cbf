mod smoke_tests;

// This file organizes the integration tests into a cohesive test suite.
// Each module tests a specific aspect of the application:
// - smoke_tests: Configuration and startup without any network access
// - google_calendar_mock: The HTTP surface against mocked OAuth and calendar backends
