mod helpers;
mod tests_resync;
