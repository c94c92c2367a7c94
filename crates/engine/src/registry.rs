//! Component descriptor registry

use std::collections::BTreeMap;
use std::path::Path;

use sitecheck_common::{Error, Result};
use tracing::{debug, info};

use crate::descriptor::{
    ComponentDescriptor, FieldDescriptor, Interaction, Read, RepeatDescriptor, SelectorSpec,
};
use crate::dom::DomAction;

/// Kind -> descriptor, validated on registration
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    descriptors: BTreeMap<String, ComponentDescriptor>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard component kinds
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        for descriptor in builtin_descriptors() {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// Add or replace a descriptor
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> Result<()> {
        descriptor.validate()?;
        debug!("Registered component kind {}", descriptor.kind);
        self.descriptors.insert(descriptor.kind.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Result<&ComponentDescriptor> {
        self.descriptors
            .get(kind)
            .ok_or_else(|| Error::UnknownComponent(kind.to_string()))
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.descriptors.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ComponentDescriptor> {
        self.descriptors.values()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Register every descriptor in a YAML document (a single descriptor or a list)
    pub fn from_yaml(&mut self, content: &str) -> Result<usize> {
        let document: serde_yaml::Value = serde_yaml::from_str(content)?;
        let descriptors: Vec<ComponentDescriptor> = if document.is_sequence() {
            serde_yaml::from_value(document)?
        } else {
            vec![serde_yaml::from_value(document)?]
        };
        let count = descriptors.len();
        for descriptor in descriptors {
            self.register(descriptor)?;
        }
        Ok(count)
    }

    pub fn from_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        self.from_yaml(&content)
    }

    /// Load all `.yaml`/`.yml` descriptor files under a directory
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        let mut total = 0;
        let mut entries: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        entries.sort_by(|a, b| a.path().cmp(b.path()));

        for entry in entries {
            let count = self.from_file(entry.path())?;
            debug!("Loaded {} descriptor(s) from {}", count, entry.path().display());
            total += count;
        }

        info!("Loaded {} component descriptor(s) from {}", total, dir.display());
        Ok(total)
    }
}

fn fallbacks(candidates: &[&str]) -> SelectorSpec {
    SelectorSpec::Fallbacks(candidates.iter().map(|s| s.to_string()).collect())
}

fn builtin_descriptors() -> Vec<ComponentDescriptor> {
    vec![
        ComponentDescriptor {
            kind: "hero_banner".into(),
            description: "Page hero with title, description, background and breadcrumb".into(),
            root: fallbacks(&[".cmp-hero", ".hero"]),
            fields: vec![
                FieldDescriptor::text("title", "h1.cmp-hero__title, .cmp-hero__title, h1").required(),
                FieldDescriptor::text("description", ".cmp-hero__description, .cmp-hero__description p"),
                FieldDescriptor::style("title_font_size", "h1.cmp-hero__title, .cmp-hero__title, h1", "font-size"),
                FieldDescriptor::style("title_color", "h1.cmp-hero__title, .cmp-hero__title, h1", "color"),
                FieldDescriptor::image("background_image", ".cmp-hero__background-image--desktop img"),
                FieldDescriptor::image("mobile_background_image", ".cmp-hero__background-image--mobile img"),
            ],
            repeat: Some(RepeatDescriptor {
                name: "breadcrumb".into(),
                locate: fallbacks(&[".cmp-breadcrumb__item", "li[itemprop=\"itemListElement\"]"]),
                fields: vec![
                    FieldDescriptor::text("label", "span[itemprop=\"name\"], a"),
                    FieldDescriptor::href("link", "a.cmp-breadcrumb__item-link, a[itemprop=\"item\"]"),
                ],
                repeat: None,
                limit: None,
            }),
            interactions: vec![],
        },
        ComponentDescriptor {
            kind: "product_cards".into(),
            description: "Featured product card grid".into(),
            root: fallbacks(&[".featured-products", "[class*=\"featured\"]", "[class*=\"products\"]"]),
            fields: vec![
                FieldDescriptor::text("title", "h1, h2, h3, .title, [class*=\"title\"]"),
                FieldDescriptor::text("card_count", ".card, .product-card").with_read(Read::Count),
            ],
            repeat: Some(RepeatDescriptor {
                name: "card".into(),
                locate: fallbacks(&[".product-card", ".card", "[class*=\"card\"]"]),
                fields: vec![
                    FieldDescriptor::text("title", "h3, h4, .title, [class*=\"title\"], [class*=\"heading\"]")
                        .required(),
                    FieldDescriptor::text("description", "p, .description, [class*=\"description\"]"),
                    FieldDescriptor::image("image", "img"),
                    FieldDescriptor::href("link", "a[href]"),
                ],
                repeat: None,
                limit: None,
            }),
            interactions: vec![],
        },
        ComponentDescriptor {
            kind: "navigation_menu".into(),
            description: "Main navigation with mega-menu links".into(),
            root: fallbacks(&[".cmp-navigation", "nav"]),
            fields: vec![FieldDescriptor::text("item_count", "li.cmp-navigation__menu-items")
                .with_read(Read::Count)],
            repeat: Some(RepeatDescriptor {
                name: "item".into(),
                locate: "li.cmp-navigation__menu-items".into(),
                fields: vec![
                    FieldDescriptor::text("label", ".cmp-navigation__menu-text").required(),
                    FieldDescriptor::href("link", ".cmp-navigation__menu-links"),
                    FieldDescriptor::text("mega_menu", ".cmp-navigation__mega-menu").with_read(Read::Count),
                ],
                repeat: Some(Box::new(RepeatDescriptor {
                    name: "mega_link".into(),
                    locate: ".cmp-navigation__mega-menu-links".into(),
                    fields: vec![
                        FieldDescriptor {
                            locate: None,
                            ..FieldDescriptor::text("label", "a")
                        },
                        FieldDescriptor {
                            locate: None,
                            ..FieldDescriptor::href("link", "a")
                        },
                    ],
                    repeat: None,
                    limit: None,
                })),
                limit: None,
            }),
            interactions: vec![],
        },
        ComponentDescriptor {
            kind: "filter_controls".into(),
            description: "Model list filtered through the interface dropdown".into(),
            root: fallbacks(&[".model-list", ".cmp-model-list"]),
            fields: vec![
                FieldDescriptor::text("title", ".model-list__title, h3"),
                FieldDescriptor::text("dropdown_count", ".cmp-custom-select").with_read(Read::Count),
                FieldDescriptor::text("product_count", ".cmp-product-cards__item, .model-list__products__product")
                    .with_read(Read::Count),
            ],
            repeat: Some(RepeatDescriptor {
                name: "product".into(),
                locate: fallbacks(&[".cmp-product-cards__item", ".model-list__products__product"]),
                fields: vec![
                    FieldDescriptor::text("title", ".cmp-product-cards__item-title, h3").required(),
                    FieldDescriptor::text("interface", ".cmp-product-cards__interface"),
                    FieldDescriptor::text("form_factor", ".cmp-product-cards__form-factor"),
                    FieldDescriptor::text("capacity", ".cmp-product-cards__capacity"),
                    FieldDescriptor::href("details", ".cmp-product-cards__details-btn"),
                ],
                repeat: None,
                limit: None,
            }),
            // options stay hidden until the dropdown is opened
            interactions: vec![
                Interaction::new(".cmp-custom-select__input", DomAction::Click),
                Interaction::new(".cmp-custom-select__option", DomAction::Click),
            ],
        },
        ComponentDescriptor {
            kind: "article_list".into(),
            description: "Article carousel".into(),
            root: fallbacks(&[".articlelist", ".cmp-article-list", "[class*=\"article-list\"]", ".splide"]),
            fields: vec![
                FieldDescriptor::text("title", ".section-title--with-link h2, h2"),
                FieldDescriptor::href("view_all", ".section-title--with-link a"),
            ],
            repeat: Some(RepeatDescriptor {
                name: "article".into(),
                locate: fallbacks(&[".splide__slide", ".cmp-article-list__article"]),
                fields: vec![
                    FieldDescriptor::text("title", ".cmp-article-list__article-title, h3").required(),
                    FieldDescriptor::text("category", ".cmp-article-list__article-category"),
                    FieldDescriptor::image("image", ".cmp-article-list__article-image img, img"),
                    FieldDescriptor::href("link", "a"),
                ],
                repeat: None,
                limit: None,
            }),
            interactions: vec![],
        },
        ComponentDescriptor {
            kind: "carousel".into(),
            description: "Slide carousel with navigation and progress indicator".into(),
            root: fallbacks(&[".cmp-carousel", ".carousel", "[class*=\"carousel\"]"]),
            fields: vec![
                FieldDescriptor::text("slide_count", ".cmp-carousel__slide, .slide").with_read(Read::Count),
                FieldDescriptor::text(
                    "previous_control",
                    "[class*=\"prev\"], [aria-label*=\"prev\"], .chevron-left",
                )
                .with_read(Read::Count),
                FieldDescriptor::text("next_control", "[class*=\"next\"], [aria-label*=\"next\"], .chevron-right")
                    .with_read(Read::Count),
                FieldDescriptor::text(
                    "progress_indicator",
                    "[class*=\"progress\"], [class*=\"indicator\"], [role=\"tablist\"]",
                )
                .with_read(Read::Count),
            ],
            repeat: Some(RepeatDescriptor {
                name: "slide".into(),
                locate: fallbacks(&[".cmp-carousel__slide", ".slide", "[class*=\"slide\"]"]),
                fields: vec![
                    FieldDescriptor::text("title", ".cmp-carousel__title, h1, h2, h3, [class*=\"title\"]").required(),
                    FieldDescriptor::text("description", ".cmp-carousel__description, p, [class*=\"description\"]"),
                    FieldDescriptor::image("image", "img"),
                    FieldDescriptor::text("button", "button, .btn, a[class*=\"btn\"], [class*=\"button\"]"),
                    FieldDescriptor::href("link", "a[href]"),
                ],
                repeat: None,
                limit: None,
            }),
            interactions: vec![],
        },
        ComponentDescriptor {
            kind: "blade".into(),
            description: "Media and content blade with call to action".into(),
            root: ".cmp-blade".into(),
            fields: vec![
                FieldDescriptor::text("title", ".cmp-blade__title, h2").required(),
                FieldDescriptor::text("description", ".cmp-blade__description"),
                FieldDescriptor::image("image", ".cmp-blade__media img"),
                FieldDescriptor::attribute("image_alt", ".cmp-blade__media img", "alt"),
                FieldDescriptor::text("button", ".cmp-blade__cta-container a, .solidigm-btn"),
                FieldDescriptor::href("button_link", ".cmp-blade__cta-container a, .solidigm-btn"),
                FieldDescriptor::attribute("button_target", ".cmp-blade__cta-container a, .solidigm-btn", "target"),
            ],
            repeat: Some(RepeatDescriptor {
                name: "link".into(),
                locate: "a[href]".into(),
                fields: vec![
                    FieldDescriptor {
                        locate: None,
                        ..FieldDescriptor::text("label", "a")
                    },
                    FieldDescriptor {
                        locate: None,
                        ..FieldDescriptor::href("href", "a")
                    },
                ],
                repeat: None,
                limit: None,
            }),
            interactions: vec![],
        },
        ComponentDescriptor {
            kind: "page_images".into(),
            description: "Every image source on the page".into(),
            root: "body".into(),
            fields: vec![],
            repeat: Some(RepeatDescriptor {
                name: "image".into(),
                locate: "img[src]".into(),
                fields: vec![
                    FieldDescriptor {
                        locate: None,
                        ..FieldDescriptor::attribute("alt", "img", "alt")
                    },
                    FieldDescriptor {
                        locate: None,
                        ..FieldDescriptor::image("src", "img")
                    },
                ],
                repeat: None,
                limit: None,
            }),
            interactions: vec![],
        },
        ComponentDescriptor {
            kind: "page_links".into(),
            description: "Every anchor on the page".into(),
            root: "body".into(),
            fields: vec![],
            repeat: Some(RepeatDescriptor {
                name: "anchor".into(),
                locate: "a[href]".into(),
                fields: vec![
                    FieldDescriptor {
                        locate: None,
                        ..FieldDescriptor::text("label", "a")
                    },
                    FieldDescriptor {
                        locate: None,
                        ..FieldDescriptor::href("href", "a")
                    },
                ],
                repeat: None,
                limit: None,
            }),
            interactions: vec![],
        },
    ]
}
