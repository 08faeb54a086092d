use syn::parse::{Parse, ParseStream};
use syn::{Error, Ident, LitInt, Token};

/// Arguments accepted by `#[coro::main]` and `#[coro::test]`.
///
/// ```text
/// #[coro::main]
/// #[coro::main(stack_size = 262144)]
/// ```
#[derive(Default)]
pub(crate) struct HubArgs {
    pub(crate) stack_size: Option<LitInt>,
}

impl Parse for HubArgs {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let mut args = HubArgs::default();

        while !input.is_empty() {
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;

            if key == "stack_size" {
                if args.stack_size.is_some() {
                    return Err(Error::new_spanned(key, "duplicate `stack_size` argument"));
                }

                let value: LitInt = input.parse()?;
                if value.base10_parse::<usize>()? == 0 {
                    return Err(Error::new_spanned(value, "`stack_size` must be greater than 0"));
                }

                args.stack_size = Some(value);
            } else {
                return Err(Error::new_spanned(
                    &key,
                    format!("unknown argument `{key}`, expected `stack_size`"),
                ));
            }

            if input.is_empty() {
                break;
            }
            input.parse::<Token![,]>()?;
        }

        Ok(args)
    }
}
