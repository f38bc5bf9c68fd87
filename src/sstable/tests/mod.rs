mod helpers;
mod tests_block;
mod tests_format;
