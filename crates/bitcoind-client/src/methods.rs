//! Named wrappers for common daemon methods.
//!
//! Each entry expands to a foreground method on [`Client`] and an `_async`
//! background twin taking [`Callbacks`]. Responses stay untyped; use
//! [`Response::result_as`] to decode them.

use bitcoin::{Amount, BlockHash, Txid};
use serde_json::Value;

use crate::client::Client;
use crate::error::ClientError;
use crate::pending::{Callbacks, PendingCall};
use crate::response::Response;

/// Conversion of a typed argument into a JSON-RPC parameter.
trait ToParam {
    fn to_param(&self) -> Value;
}

impl ToParam for BlockHash {
    fn to_param(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl ToParam for Txid {
    fn to_param(&self) -> Value {
        Value::String(self.to_string())
    }
}

/// Amounts are sent in BTC, the unit the daemon expects.
impl ToParam for Amount {
    fn to_param(&self) -> Value {
        Value::from(self.to_btc())
    }
}

impl ToParam for str {
    fn to_param(&self) -> Value {
        Value::String(self.to_owned())
    }
}

impl ToParam for u32 {
    fn to_param(&self) -> Value {
        Value::from(*self)
    }
}

impl ToParam for u64 {
    fn to_param(&self) -> Value {
        Value::from(*self)
    }
}

impl ToParam for bool {
    fn to_param(&self) -> Value {
        Value::Bool(*self)
    }
}

impl<T: ToParam + ?Sized> ToParam for &T {
    fn to_param(&self) -> Value {
        (**self).to_param()
    }
}

macro_rules! rpc_methods {
    ($(
        #[doc = $doc:expr]
        $name:ident, $async_name:ident => $rpc:literal ($($arg:ident: $ty:ty),*);
    )*) => {
        impl Client {
            $(
                #[doc = $doc]
                pub async fn $name(&self, $($arg: $ty),*) -> Result<Response, ClientError> {
                    let params: Vec<Value> = vec![$($arg.to_param()),*];
                    self.call($rpc, params).await
                }

                #[doc = concat!("Background variant of [`Client::", stringify!($name), "`].")]
                pub fn $async_name(
                    &self,
                    $($arg: $ty,)*
                    callbacks: Callbacks,
                ) -> Result<PendingCall, ClientError> {
                    let params: Vec<Value> = vec![$($arg.to_param()),*];
                    self.call_async($rpc, params, callbacks)
                }
            )*
        }
    };
}

rpc_methods! {
    #[doc = "`getblockchaininfo`: chain name, height and sync state."]
    get_blockchain_info, get_blockchain_info_async => "getblockchaininfo" ();

    #[doc = "`getnetworkinfo`: peer-to-peer networking state."]
    get_network_info, get_network_info_async => "getnetworkinfo" ();

    #[doc = "`getblockcount`: height of the most-work chain."]
    get_block_count, get_block_count_async => "getblockcount" ();

    #[doc = "`getbestblockhash`: tip of the most-work chain."]
    get_best_block_hash, get_best_block_hash_async => "getbestblockhash" ();

    #[doc = "`getblockhash`: hash of the block at `height`."]
    get_block_hash, get_block_hash_async => "getblockhash" (height: u64);

    #[doc = "`getblockheader`: header as an object, or hex when `verbose` is false."]
    get_block_header, get_block_header_async => "getblockheader" (hash: &BlockHash, verbose: bool);

    #[doc = "`getblock` at the given verbosity (0 hex, 1 txids, 2 decoded)."]
    get_block, get_block_async => "getblock" (hash: &BlockHash, verbosity: u32);

    #[doc = "`getrawtransaction`: hex, or a decoded object when `verbose` is set."]
    get_raw_transaction, get_raw_transaction_async => "getrawtransaction" (txid: &Txid, verbose: bool);

    #[doc = "`gettxout`: an unspent output, or a null result when spent."]
    get_tx_out, get_tx_out_async => "gettxout" (txid: &Txid, vout: u32);

    #[doc = "`getmempoolinfo`: mempool size and fee floor."]
    get_mempool_info, get_mempool_info_async => "getmempoolinfo" ();

    #[doc = "`getrawmempool`: txids currently in the mempool."]
    get_raw_mempool, get_raw_mempool_async => "getrawmempool" ();

    #[doc = "`estimatesmartfee`: fee rate for confirmation within `conf_target` blocks."]
    estimate_smart_fee, estimate_smart_fee_async => "estimatesmartfee" (conf_target: u32);

    #[doc = "`getwalletinfo` for the selected wallet."]
    get_wallet_info, get_wallet_info_async => "getwalletinfo" ();

    #[doc = "`getbalance` of the selected wallet, in BTC."]
    get_balance, get_balance_async => "getbalance" ();

    #[doc = "`getnewaddress` with the given label."]
    get_new_address, get_new_address_async => "getnewaddress" (label: &str);

    #[doc = "`validateaddress`: whether `address` is valid and what it encodes."]
    validate_address, validate_address_async => "validateaddress" (address: &str);

    #[doc = "`sendtoaddress`: pay `amount` to `address` from the selected wallet."]
    send_to_address, send_to_address_async => "sendtoaddress" (address: &str, amount: Amount);

    #[doc = "`listunspent` of the selected wallet."]
    list_unspent, list_unspent_async => "listunspent" ();

    #[doc = "`uptime`: seconds since the daemon started."]
    uptime, uptime_async => "uptime" ();
}
