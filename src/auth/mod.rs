pub mod callback_server;
pub mod google_auth;
pub mod oauth_client;
pub mod token_store;
