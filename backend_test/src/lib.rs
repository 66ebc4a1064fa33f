use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, LitInt, Pat, Signature, Type};

/// Number of nodes started when the attribute names none.
const DEFAULT_NODES: usize = 3;

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that the cluster is shut down regardless of how the test terminates.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`], bound
/// to node 0, and [`crate::cluster::LocalCluster`]. The cluster size defaults
/// to three nodes and can be given as `#[backend_test(5)]`.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the parameters to inject and reject invalid function signatures.
    let test_args = match check_sig(&item_fn.sig) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Read the cluster size.
    let nodes = match parse_macro_input!(args as Option<LitInt>) {
        Some(lit) => match lit.base10_parse::<usize>() {
            Ok(0) => {
                return syn::Error::new(lit.span(), "A cluster needs at least one node")
                    .into_compile_error()
                    .into()
            }
            Ok(nodes) => nodes,
            Err(err) => return err.into_compile_error().into(),
        },
        None => DEFAULT_NODES,
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (rocket::local::asynchronous::Client, crate::cluster::LocalCluster) {
                log4rs_test_utils::test_logging::init_logging_once_for(
                    ["evote_backend"],
                    None,
                    None,
                );
                let cluster = crate::cluster::LocalCluster::new(#nodes, &crate::Config::default()).await;
                let rocket = crate::build(cluster.node(0).clone(), rocket::Config::figment());
                let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .unwrap();
                (rocket_client, cluster)
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(cluster: crate::cluster::LocalCluster) {
                cluster.shutdown().await;
            }

            // Create an async runtime shared by setup, test and cleanup.
            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            #[allow(unused_variables)]
            let (rocket_client, cluster) = runtime.block_on(setup());

            // Run the test, catching any panics.
            #[allow(unused_variables)]
            let test_cluster = cluster.clone();
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                runtime.block_on(#new_name(#(#test_args),*));
            }));

            // Run the cleanup.
            runtime.block_on(cleanup(cluster));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::resume_unwind(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: &Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_cluster = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                // Valid as the last path segment for any type is itself
                let type_ident = &type_path.path.segments.last().unwrap().ident;
                if type_ident == "Client" {
                    if has_client {
                        return Err(syn::Error::new(
                            input.span(),
                            "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                        ));
                    }
                    has_client = true;
                    args.push(quote! { rocket_client });
                    continue;
                } else if type_ident == "LocalCluster" {
                    if has_cluster {
                        return Err(syn::Error::new(
                            input.span(),
                            "Test cannot accept more than one `LocalCluster`",
                        ));
                    }
                    has_cluster = true;
                    args.push(quote! { test_cluster });
                    continue;
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client` or `cluster_ident: LocalCluster`",
        ));
    }

    Ok(args)
}
