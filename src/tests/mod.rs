
mod test_coordinator;
mod test_procedure;
