use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Attribute, ItemFn, LitInt};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Default)]
struct TimeoutArgs {
    secs: Option<u64>,
    paused: bool,
}

/// Runs a test on its own thread and fails it once the wall-clock limit
/// passes.
///
/// ```ignore
/// #[test_timeout::timeout]
/// fn sync_test() {}
///
/// #[test_timeout::timeout(secs = 5, paused)]
/// async fn clock_driven_test() {}
/// ```
///
/// Async tests get a current-thread Tokio runtime. `paused` starts that
/// runtime with the clock frozen so timers advance only when every task is
/// idle or when the test calls `tokio::time::advance`.
#[proc_macro_attribute]
pub fn timeout(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut args = TimeoutArgs::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("secs") {
            let lit: LitInt = meta.value()?.parse()?;
            let secs: u64 = lit.base10_parse()?;
            if secs == 0 {
                return Err(meta.error("timeout must be greater than zero"));
            }
            args.secs = Some(secs);
            Ok(())
        } else if meta.path.is_ident("paused") {
            args.paused = true;
            Ok(())
        } else {
            Err(meta.error("expected `secs = N` or `paused`"))
        }
    });
    parse_macro_input!(attr with parser);

    let ItemFn {
        attrs,
        vis,
        mut sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    let attrs: Vec<Attribute> = attrs
        .into_iter()
        .filter(|attr| !is_test_attribute(attr))
        .collect();
    let timeout = args.secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

    let body = if sig.asyncness.take().is_some() {
        let paused = args.paused;
        quote! {
            let mut builder = tokio::runtime::Builder::new_current_thread();
            builder.enable_all();
            if #paused {
                builder.start_paused(true);
            }
            let runtime = builder.build().expect("failed to build Tokio runtime");
            runtime.block_on(async move {
                tokio::time::timeout(timeout_duration, async move #block)
                    .await
                    .expect("test timed out");
            });
        }
    } else if args.paused {
        return syn::Error::new_spanned(&sig.ident, "`paused` requires an async test function")
            .to_compile_error()
            .into();
    } else {
        quote! { #block }
    };

    TokenStream::from(quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let timeout_duration = std::time::Duration::from_secs(#timeout);
            let (sender, receiver) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    #body
                }));
                let _ = sender.send(result);
            });
            match receiver.recv_timeout(timeout_duration) {
                Ok(Ok(())) => {}
                Ok(Err(payload)) => std::panic::resume_unwind(payload),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => panic!("test timed out"),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    panic!("test thread failed before reporting result")
                }
            }
        }
    })
}

/// Drops `#[test]` and `#[tokio::test]` so they are not applied twice.
fn is_test_attribute(attr: &Attribute) -> bool {
    let mut segments = attr.path().segments.iter().map(|segment| &segment.ident);
    match (segments.next(), segments.next(), segments.next()) {
        (Some(name), None, None) => name == "test",
        (Some(first), Some(second), None) => first == "tokio" && second == "test",
        _ => false,
    }
}
