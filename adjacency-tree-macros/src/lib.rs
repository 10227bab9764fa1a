use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{parse_macro_input, spanned::Spanned, Attribute, Data, DeriveInput, Fields, Ident};

#[proc_macro_derive(AdjacencyModel, attributes(adjacency_tree))]
pub fn derive_adjacency_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match impl_adjacency_model(&input) {
        Ok(tokens) => tokens,
        Err(err) => err.to_compile_error().into(),
    }
}

#[derive(Default)]
struct Options {
    id_field: Option<String>,
    parent_field: Option<String>,
    data_field: Option<String>,
    entity_name: Option<String>,
    dependent: Option<Ident>,
    max_depth: Option<u32>,
    parent_batch_size: Option<usize>,
}

fn impl_adjacency_model(input: &DeriveInput) -> syn::Result<TokenStream> {
    let struct_ident = &input.ident;

    let data_struct = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new(
                input.span(),
                "AdjacencyModel can only be derived for structs",
            ))
        }
    };

    let mut options = Options::default();
    let mut table_name: Option<String> = None;

    for attr in &input.attrs {
        if attr.path().is_ident("adjacency_tree") {
            parse_adjacency_tree_attr(attr, &mut options)?;
        }

        if attr.path().is_ident("sea_orm") {
            if let Some(name) = parse_sea_orm_table_name(attr)? {
                table_name = Some(name);
            }
        }
    }

    let id_field_name = options.id_field.unwrap_or_else(|| "id".to_string());
    let parent_field_name = options
        .parent_field
        .unwrap_or_else(|| "parent_id".to_string());
    let data_field_name = options.data_field.unwrap_or_else(|| "data".to_string());

    let Fields::Named(ref fields) = data_struct.fields else {
        return Err(syn::Error::new(
            data_struct.fields.span(),
            "AdjacencyModel requires named fields",
        ));
    };

    for required in [&id_field_name, &parent_field_name, &data_field_name] {
        let present = fields
            .named
            .iter()
            .filter_map(|field| field.ident.as_ref())
            .any(|ident| ident.unraw() == required.as_str());
        if !present {
            return Err(syn::Error::new(
                struct_ident.span(),
                format!("AdjacencyModel expects a field named `{required}`"),
            ));
        }
    }

    let id_field_ident = Ident::new(&id_field_name, struct_ident.span());
    let parent_field_ident = Ident::new(&parent_field_name, struct_ident.span());
    let data_field_ident = Ident::new(&data_field_name, struct_ident.span());

    let entity_name = options
        .entity_name
        .unwrap_or_else(|| struct_ident.unraw().to_string());
    let table_name = table_name.unwrap_or_else(|| struct_ident.unraw().to_string());

    let id_column_variant = format_ident!("{}", to_pascal_case(&id_field_name));
    let parent_column_variant = format_ident!("{}", to_pascal_case(&parent_field_name));

    let id_column_literal = syn::LitStr::new(&id_field_name, struct_ident.span());
    let parent_column_literal = syn::LitStr::new(&parent_field_name, struct_ident.span());
    let data_column_literal = syn::LitStr::new(&data_field_name, struct_ident.span());
    let table_name_literal = syn::LitStr::new(&table_name, struct_ident.span());
    let entity_name_literal = syn::LitStr::new(&entity_name, struct_ident.span());

    let dependent = options.dependent.map(|variant| {
        quote! { .dependent_behavior(::adjacency_tree::DependentBehavior::#variant) }
    });
    let max_depth = options
        .max_depth
        .map(|depth| quote! { .max_depth(#depth) });
    let parent_batch_size = options
        .parent_batch_size
        .map(|size| quote! { .parent_batch_size(#size) });

    let generated = quote! {
        impl ::adjacency_tree::AdjacencyModel for #struct_ident {
            type Entity = Entity;
            type ActiveModel = ActiveModel;

            fn adjacency_config() -> &'static ::adjacency_tree::HierarchyConfig {
                static CONFIG: ::once_cell::sync::Lazy<::adjacency_tree::HierarchyConfig> =
                    ::once_cell::sync::Lazy::new(|| {
                        let base = ::adjacency_tree::HierarchyConfig::new(
                            #entity_name_literal,
                            #table_name_literal,
                        );
                        ::adjacency_tree::HierarchyOptions::default()
                            .id_column(#id_column_literal)
                            .parent_column(#parent_column_literal)
                            .data_column(#data_column_literal)
                            #dependent
                            #max_depth
                            #parent_batch_size
                            .apply(base)
                    });
                &CONFIG
            }

            fn id(&self) -> ::uuid::Uuid {
                self.#id_field_ident
            }

            fn parent_id(&self) -> ::core::option::Option<::uuid::Uuid> {
                self.#parent_field_ident
            }

            fn data(&self) -> &str {
                self.#data_field_ident.as_str()
            }

            fn active_model_from_node(node: &::adjacency_tree::Node) -> Self::ActiveModel {
                #[allow(clippy::needless_update)]
                {
                    ActiveModel {
                        #id_field_ident: ::sea_orm::ActiveValue::Set(node.id),
                        #parent_field_ident: ::sea_orm::ActiveValue::Set(node.parent_id),
                        #data_field_ident: ::sea_orm::ActiveValue::Set(node.data.clone()),
                        ..::core::default::Default::default()
                    }
                }
            }

            fn set_parent(active: &mut Self::ActiveModel, parent: ::core::option::Option<::uuid::Uuid>) {
                active.#parent_field_ident = ::sea_orm::ActiveValue::Set(parent);
            }

            fn id_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#id_column_variant
            }

            fn parent_column() -> <Self::Entity as ::sea_orm::EntityTrait>::Column {
                Column::#parent_column_variant
            }
        }
    };

    Ok(generated.into())
}

fn parse_adjacency_tree_attr(attr: &Attribute, options: &mut Options) -> syn::Result<()> {
    attr.parse_nested_meta(|meta| {
        let ident = meta
            .path
            .get_ident()
            .ok_or_else(|| syn::Error::new(meta.path.span(), "Invalid option key"))?
            .to_string();

        match ident.as_str() {
            "id_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.id_field = Some(value.value());
            }
            "parent_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.parent_field = Some(value.value());
            }
            "data_field" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.data_field = Some(value.value());
            }
            "entity_name" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                options.entity_name = Some(value.value());
            }
            "dependent" => {
                let value: syn::LitStr = meta.value()?.parse()?;
                let variant = match value.value().as_str() {
                    "destroy" => "Destroy",
                    "restrict" => "Restrict",
                    "nullify" => "Nullify",
                    other => {
                        return Err(syn::Error::new(
                            value.span(),
                            format!(
                                "Unsupported dependent behavior `{other}`; expected destroy, restrict or nullify"
                            ),
                        ));
                    }
                };
                options.dependent = Some(Ident::new(variant, value.span()));
            }
            "max_depth" => {
                let value: syn::LitInt = meta.value()?.parse()?;
                options.max_depth = Some(value.base10_parse()?);
            }
            "parent_batch_size" => {
                let value: syn::LitInt = meta.value()?.parse()?;
                let size: usize = value.base10_parse()?;
                if size == 0 {
                    return Err(syn::Error::new(
                        value.span(),
                        "parent_batch_size must be at least 1",
                    ));
                }
                options.parent_batch_size = Some(size);
            }
            other => {
                return Err(syn::Error::new(
                    meta.path.span(),
                    format!("Unsupported adjacency_tree option `{other}`"),
                ));
            }
        }

        Ok(())
    })
}

fn parse_sea_orm_table_name(attr: &Attribute) -> syn::Result<Option<String>> {
    let mut table_name: Option<String> = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("table_name") {
            let value: syn::LitStr = meta.value()?.parse()?;
            table_name = Some(value.value());
        } else if meta.input.peek(syn::Token![=]) {
            let _: syn::Expr = meta.value()?.parse()?;
        }
        Ok(())
    })?;
    Ok(table_name)
}

fn to_pascal_case(value: &str) -> String {
    value
        .split('_')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}
