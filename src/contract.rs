//! Typed service contracts.
//!
//! A contract is declared once with [`contract!`](crate::contract!) and
//! shared by reference between client and server code. The declaration
//! generates:
//!
//! - a trait the server implementation must satisfy (checked at compile
//!   time),
//! - a `Service` wrapper that dispatches envelopes to that trait,
//! - a client stub with one typed async method per contract method.
//!
//! # Example
//!
//! ```
//! use ctxrpc::{contract, Failure};
//!
//! contract! {
//!     /// Arithmetic served by each inspected page.
//!     pub contract Math {
//!         channel = "math";
//!         client = MathClient;
//!         service = MathService;
//!
//!         fn add(a: i64, b: i64) -> i64;
//!         fn fail() -> ();
//!     }
//! }
//!
//! struct Calculator;
//!
//! impl Math for Calculator {
//!     async fn add(&self, a: i64, b: i64) -> Result<i64, Failure> {
//!         Ok(a + b)
//!     }
//!
//!     async fn fail(&self) -> Result<(), Failure> {
//!         Err(Failure::new("boom"))
//!     }
//! }
//!
//! let _service = MathService(Calculator);
//! assert_eq!(MathClient::CHANNEL, "math");
//! ```

use serde::de::DeserializeOwned;

use crate::{
    // ---
    log_warn,
    Channel,
    Failure,
    Value,
};

/// Positional argument reader used by generated dispatch code.
#[doc(hidden)]
pub struct Args {
    method: &'static str,
    items: std::vec::IntoIter<Value>,
}

impl Args {
    pub fn new(method: &'static str, args: Vec<Value>) -> Self {
        // ---
        Self {
            method,
            items: args.into_iter(),
        }
    }

    /// Decode the next positional argument. A missing argument reads as
    /// `null`, so trailing `Option` parameters may be omitted.
    pub fn next<T>(&mut self, name: &str) -> std::result::Result<T, Failure>
    where
        T: DeserializeOwned,
    {
        // ---
        let value = self.items.next().unwrap_or_default();
        value.decode::<T>().map_err(|e| {
            log_warn!("{}: invalid argument `{name}`: {e}", self.method);
            Failure::new(format!("invalid argument `{name}` for {}: {e}", self.method))
        })
    }
}

/// Failure for a method the service does not implement, logged as a
/// configuration problem.
#[doc(hidden)]
pub fn unknown_method(channel: &Channel, method: &str) -> Failure {
    // ---
    log_warn!("no method {method} on channel {channel}");
    Failure::no_such_method(method)
}

/// Declare a service contract.
///
/// See the [module documentation](mod@crate::contract) for the generated items.
/// Every method's server side returns `Result<T, Failure>`; the client side
/// returns `ctxrpc::Result<T>`.
#[macro_export]
macro_rules! contract {
    (
        $(#[$meta:meta])*
        $vis:vis contract $name:ident {
            channel = $channel:literal;
            client = $client:ident;
            service = $service:ident;

            $(
                $(#[$mmeta:meta])*
                fn $method:ident ( $( $arg:ident : $ty:ty ),* $(,)? ) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis trait $name: ::std::marker::Send + ::std::marker::Sync + 'static {
            $(
                $(#[$mmeta])*
                fn $method(&self $(, $arg: $ty)*)
                    -> impl ::std::future::Future<
                        Output = ::std::result::Result<$ret, $crate::Failure>,
                    > + ::std::marker::Send;
            )*
        }

        #[doc = concat!("Dispatches `", $channel, "` requests to a [`", stringify!($name), "`] implementation.")]
        $vis struct $service<T>(pub T);

        impl<T: $name> $crate::Service for $service<T> {
            fn channel(&self) -> $crate::Channel {
                $crate::Channel::from($channel)
            }

            fn dispatch<'a>(
                &'a self,
                method: &'a str,
                args: ::std::vec::Vec<$crate::Value>,
            ) -> $crate::BoxFuture<'a, ::std::result::Result<$crate::Value, $crate::Failure>> {
                ::std::boxed::Box::pin(async move {
                    match method {
                        $(
                            stringify!($method) => {
                                #[allow(unused_mut, unused_variables)]
                                let mut __args = $crate::contract::Args::new(stringify!($method), args);
                                $( let $arg: $ty = __args.next(stringify!($arg))?; )*
                                let __out = self.0.$method($($arg),*).await?;
                                $crate::Value::encode(&__out).map_err($crate::Failure::from)
                            }
                        )*
                        other => ::std::result::Result::Err(
                            $crate::contract::unknown_method(&$crate::Channel::from($channel), other),
                        ),
                    }
                })
            }
        }

        #[doc = concat!("Client stub for the `", $channel, "` contract.")]
        #[derive(Clone)]
        $vis struct $client {
            client: $crate::RpcClient,
        }

        impl $client {
            pub const CHANNEL: &'static str = $channel;

            /// Subscribe to `transport` and return a stub bound to this contract's channel.
            pub async fn connect(transport: $crate::TransportPtr) -> $crate::Result<Self> {
                ::std::result::Result::Ok(Self {
                    client: $crate::RpcClient::new(transport, $channel).await?,
                })
            }

            /// Like [`connect`](Self::connect) with an explicit configuration.
            pub async fn connect_with_config(
                transport: $crate::TransportPtr,
                config: &$crate::RpcConfig,
            ) -> $crate::Result<Self> {
                ::std::result::Result::Ok(Self {
                    client: $crate::RpcClient::with_config(transport, $channel, config).await?,
                })
            }

            /// Use `channel` instead of the declared one (e.g. a session channel
            /// behind a relay).
            pub async fn connect_on(
                transport: $crate::TransportPtr,
                channel: impl ::std::convert::Into<$crate::Channel>,
            ) -> $crate::Result<Self> {
                ::std::result::Result::Ok(Self {
                    client: $crate::RpcClient::new(transport, channel).await?,
                })
            }

            pub fn rpc(&self) -> &$crate::RpcClient {
                &self.client
            }

            /// Dispose of the underlying transport, rejecting pending calls.
            pub async fn dispose(&self) -> $crate::Result<()> {
                self.client.dispose().await
            }

            $(
                $(#[$mmeta])*
                pub async fn $method(&self $(, $arg: $ty)*) -> $crate::Result<$ret> {
                    let args: ::std::vec::Vec<$crate::Value> =
                        ::std::vec![ $( $crate::Value::encode(&$arg)? ),* ];
                    self.client.call(stringify!($method), args).await?.decode()
                }
            )*
        }
    };
}
