pub mod http;

#[cfg(test)]
mod tests;
