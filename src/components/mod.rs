// Export components
pub mod google_calendar;
