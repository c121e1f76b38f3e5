use dotenv::dotenv;

/// Load environment variables from the ".env" file, if it exists.
pub fn load_env() {
  dotenv().ok();
}
