pub mod http;

#[cfg(test)]
mod http_test;
