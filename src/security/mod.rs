pub mod webhook_signer;
