extern crate proc_macro;
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::parse::Parser;
use syn::punctuated::Punctuated;
use syn::token::Comma;
use syn::{parse_macro_input, ItemFn, MetaNameValue};

/// Attribute macro `export(name = "fname")` placing a function in every
/// script's `retro` table.
///
/// The function must have the shape `fn(&mlua::Lua, A) -> mlua::Result<R>`
/// accepted by `Lua::create_function`. `name` is optional; if omitted the
/// function's identifier is used.
#[proc_macro_attribute]
pub fn export(attr: TokenStream, item: TokenStream) -> TokenStream {
    let parser = Punctuated::<MetaNameValue, Comma>::parse_terminated;
    let args: Punctuated<MetaNameValue, Comma> = match parser.parse(attr) {
        Ok(v) => v,
        Err(e) => return e.to_compile_error().into(),
    };

    let mut name_override: Option<String> = None;

    for nv in args.iter() {
        let Some(ident) = nv.path.get_ident() else {
            continue;
        };
        if let syn::Expr::Lit(expr_lit) = &nv.value
            && let syn::Lit::Str(s) = &expr_lit.lit
        {
            match ident.to_string().as_str() {
                "name" => name_override = Some(s.value()),
                other => {
                    return syn::Error::new_spanned(
                        &nv.path,
                        format!("unknown export argument `{other}`"),
                    )
                    .to_compile_error()
                    .into();
                }
            }
        }
    }

    let input_fn = parse_macro_input!(item as ItemFn);
    let fn_ident = input_fn.sig.ident.clone();
    let install_ident = format_ident!("__retro_script_install_{}", fn_ident);

    let func_name = name_override.unwrap_or_else(|| fn_ident.to_string());
    let name_lit = syn::LitStr::new(&func_name, proc_macro2::Span::call_site());

    let expanded = quote! {
        #input_fn

        #[doc(hidden)]
        fn #install_ident(lua: &::mlua::Lua) -> ::mlua::Result<::mlua::Function> {
            lua.create_function(#fn_ident)
        }

        inventory::submit! {
            crate::ScriptExport {
                name: #name_lit,
                install: #install_ident,
            }
        }
    };

    TokenStream::from(expanded)
}
