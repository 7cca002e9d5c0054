pub mod decommission_scenario_test;
