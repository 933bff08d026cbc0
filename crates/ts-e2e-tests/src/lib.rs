//! End-to-end tests for ThingSync live under `tests/`.
