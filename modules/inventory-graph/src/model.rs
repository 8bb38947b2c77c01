//! The media inventory: entries describing news sources, the organizations
//! behind them, and the archives and papers that cover them.

use serde_json::json;

use inventory_common::{Result, ReviewStatus, UserRole};

use crate::predicate::{Choices, Facet, FacetKind, Predicate};
use crate::schema::{EntityType, Schema};

/// Type of the account nodes that submit and review entries.
pub const USER_TYPE: &str = "User";

const REVIEW_STATUS: &[(&str, &str)] = &[
    ("draft", "Draft"),
    ("pending", "Pending"),
    ("accepted", "Accepted"),
    ("rejected", "Rejected"),
];

const YES_NO_NA: &[(&str, &str)] = &[("NA", "Don't know / NA"), ("yes", "Yes"), ("no", "No")];

const OWNERSHIP_KIND: &[(&str, &str)] = &[
    ("NA", "Don't know / NA"),
    ("public ownership", "Mainly public ownership"),
    ("private ownership", "Mainly private ownership"),
    ("political party", "Political party"),
    ("unknown", "Unknown ownership"),
];

const PUBLICATION_KIND: &[(&str, &str)] = &[
    ("newspaper", "Newspaper"),
    ("news site", "News site"),
    ("news agency", "News agency"),
    ("magazine", "Magazine"),
    ("tv show", "TV show"),
    ("tv channel", "TV channel"),
    ("radio show", "Radio show"),
    ("radio channel", "Radio channel"),
    ("podcast", "Podcast"),
    ("newsletter", "Newsletter"),
    ("blog", "Blog"),
    ("alternative media", "Alternative media"),
    ("organizational communication", "Organizational communication"),
];

const TOPICAL_FOCUS: &[(&str, &str)] = &[
    ("politics", "Politics"),
    ("society", "Society"),
    ("economy", "Economy"),
    ("religion", "Religion"),
    ("science", "Science"),
    ("culture", "Culture"),
    ("sports", "Sports"),
    ("environment", "Environment"),
    ("local", "Local news"),
];

const GEOGRAPHIC_SCOPE: &[(&str, &str)] = &[
    ("multinational", "Multinational"),
    ("national", "National"),
    ("subnational", "Subnational"),
    ("NA", "Don't know / NA"),
];

const PAYMENT_MODEL: &[(&str, &str)] = &[
    ("free", "Free, all content is free of charge"),
    ("partly free", "Some content is free of charge"),
    ("soft paywall", "Soft paywall"),
    ("subscription", "All content requires a subscription"),
    ("NA", "Don't know / NA"),
];

const CONTAINS_ADS: &[(&str, &str)] = &[
    ("yes", "Yes"),
    ("no", "No"),
    ("non subscribers", "Only for non-subscribers"),
    ("NA", "Don't know / NA"),
];

const PUBLICATION_CYCLE: &[(&str, &str)] = &[
    ("continuous", "Continuous"),
    ("daily", "Daily"),
    ("multiple times per week", "Multiple times per week"),
    ("weekly", "Weekly"),
    ("twice a month", "Twice a month"),
    ("monthly", "Monthly"),
    ("less than monthly", "Less frequent than monthly"),
    ("NA", "Don't know / NA"),
];

const LANGUAGES: &[(&str, &str)] = &[
    ("de", "German"),
    ("en", "English"),
    ("fr", "French"),
    ("it", "Italian"),
    ("es", "Spanish"),
    ("pt", "Portuguese"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("cs", "Czech"),
    ("sk", "Slovak"),
    ("hu", "Hungarian"),
    ("ro", "Romanian"),
    ("bg", "Bulgarian"),
    ("hr", "Croatian"),
    ("sl", "Slovenian"),
    ("sr", "Serbian"),
    ("el", "Greek"),
    ("tr", "Turkish"),
    ("sv", "Swedish"),
    ("da", "Danish"),
    ("no", "Norwegian"),
    ("fi", "Finnish"),
    ("et", "Estonian"),
    ("lv", "Latvian"),
    ("lt", "Lithuanian"),
    ("ru", "Russian"),
    ("uk", "Ukrainian"),
    ("ar", "Arabic"),
];

const AUDIENCE_UNIT: &[(&str, &str)] = &[
    ("followers", "Followers"),
    ("subscribers", "Subscribers"),
    ("copies sold", "Copies sold"),
    ("daily visitors", "Daily visitors"),
    ("monthly visitors", "Monthly visitors"),
    ("likes", "Likes"),
    ("viewers", "Viewers"),
    ("listeners", "Listeners"),
];

const FEED_KIND: &[(&str, &str)] = &[("rss", "RSS"), ("xml", "XML"), ("sitemap", "Sitemap")];

const ACCESS: &[(&str, &str)] = &[
    ("free", "Free"),
    ("restricted", "Restricted"),
    ("NA", "Don't know / NA"),
];

/// Fields that new sibling sources copy from the source they were added with.
pub const SIBLING_INHERITED: &[&str] = &[
    "publication_kind",
    "special_interest",
    "topical_focus",
    "geographic_scope",
    "country",
    "geographic_scope_subunit",
    "languages",
    "party_affiliated",
];

/// Submission metadata facets on `entry_added`, `entry_edit_history` and `reviewed_by`.
fn submission_facets(p: Predicate) -> Predicate {
    p.facet(Facet::new("timestamp", FacetKind::DateTime))
        .facet(Facet::new("ip", FacetKind::String))
}

fn entry() -> EntityType {
    EntityType::new("Entry").predicates(vec![
        Predicate::uid(),
        Predicate::unique_name("unique_name")
            .required()
            .not_new()
            .permission(UserRole::Reviewer),
        Predicate::string("name").required(),
        Predicate::list_string("other_names").queryable(),
        Predicate::string("entry_notes")
            .description("Do you have any other notes on the entry that you just coded?"),
        Predicate::integer("wikidata_id").label("WikiData ID").not_new(),
        Predicate::single_choice("entry_review_status", REVIEW_STATUS)
            .required()
            .not_new()
            .queryable()
            .default_value(json!(ReviewStatus::Pending.as_str()))
            .permission(UserRole::Reviewer),
        Predicate::datetime("creation_date").not_new().read_only(),
        submission_facets(Predicate::single_relationship("entry_added", &[USER_TYPE]))
            .overwrite(false)
            .not_new()
            .read_only(),
        submission_facets(Predicate::list_relationship("entry_edit_history", &[USER_TYPE]))
            .overwrite(false)
            .not_new()
            .read_only(),
        submission_facets(Predicate::single_relationship("reviewed_by", &[USER_TYPE]))
            .not_new()
            .read_only(),
    ])
}

fn organization() -> EntityType {
    EntityType::new("Organization").extends("Entry").predicates(vec![
        Predicate::string("name")
            .label("Organization Name")
            .required()
            .description("What is the legal or official name of the media organisation?"),
        Predicate::boolean("is_person")
            .default_value(json!(false))
            .queryable()
            .description("Is the media organisation a person?"),
        Predicate::single_choice("ownership_kind", OWNERSHIP_KIND).queryable(),
        Predicate::single_relationship("country", &["Country"])
            .queryable()
            .description("In which country is the organisation located?"),
        Predicate::list_relationship("publishes", &["Source"])
            .queryable()
            .description("Which news sources publishes the organisation (or person)?"),
        Predicate::list_relationship("owns", &["Organization"])
            .queryable()
            .description("Which other media organisations are owned by this organisation?"),
        Predicate::single_choice("party_affiliated", YES_NO_NA).queryable(),
        Predicate::string("address_string").not_new(),
        Predicate::geo("address_geo").not_new().read_only(),
        Predicate::integer_in("employees", 0, 10_000_000)
            .queryable()
            .not_new()
            .description("How many employees does the news organization have?"),
        Predicate::datetime("founded").queryable().not_new(),
    ])
}

fn source() -> EntityType {
    EntityType::new("Source").extends("Entry").predicates(vec![
        Predicate::single_relationship("channel", &["Channel"])
            .required()
            .queryable()
            .not_edit(),
        Predicate::string("channel_url"),
        Predicate::list_string("channel_feeds")
            .facet(Facet::new("kind", FacetKind::Choice(Choices::new(FEED_KIND)))),
        Predicate::multiple_choice("publication_kind", PUBLICATION_KIND).queryable(),
        Predicate::single_choice("special_interest", YES_NO_NA).queryable(),
        Predicate::multiple_choice("topical_focus", TOPICAL_FOCUS).queryable(),
        Predicate::single_choice("geographic_scope", GEOGRAPHIC_SCOPE).queryable(),
        Predicate::single_relationship("country", &["Country", "Multinational"]).queryable(),
        Predicate::list_relationship("geographic_scope_subunit", &["Subunit"])
            .allow_new()
            .queryable(),
        Predicate::multiple_choice("languages", LANGUAGES).queryable(),
        Predicate::single_choice("payment_model", PAYMENT_MODEL).queryable(),
        Predicate::single_choice("contains_ads", CONTAINS_ADS).queryable(),
        Predicate::single_choice("publication_cycle", PUBLICATION_CYCLE).queryable(),
        Predicate::datetime("audience_size")
            .description("Date the audience figure refers to")
            .facet(Facet::new("count", FacetKind::Integer).queryable())
            .facet(Facet::new("unit", FacetKind::Choice(Choices::new(AUDIENCE_UNIT))).queryable())
            .facet(Facet::new("data_from", FacetKind::String)),
        Predicate::boolean("verified_account").queryable(),
        Predicate::single_choice("party_affiliated", YES_NO_NA).queryable(),
        Predicate::datetime("founded").queryable(),
        Predicate::list_relationship("related", &["Source"]).queryable(),
        Predicate::mutual_list_relationship("sibling_sources", &["Source"]).allow_new(),
        Predicate::reverse_list_relationship("publishes_org", "publishes", &["Organization"])
            .allow_new()
            .label("Published by"),
        Predicate::reverse_list_relationship(
            "archives",
            "sources_included",
            &["Archive", "Dataset"],
        ),
    ])
}

fn channel() -> EntityType {
    EntityType::new("Channel")
        .extends("Entry")
        .permission(UserRole::Admin)
}

fn country() -> EntityType {
    EntityType::new("Country")
        .extends("Entry")
        .permission(UserRole::Admin)
        .predicates(vec![
            Predicate::string("country_code").queryable(),
            Predicate::boolean("opted_scope"),
        ])
}

fn multinational() -> EntityType {
    EntityType::new("Multinational")
        .extends("Country")
        .permission(UserRole::Admin)
        .predicates(vec![Predicate::list_relationship("member_countries", &["Country"])])
}

fn subunit() -> EntityType {
    EntityType::new("Subunit").extends("Entry").predicates(vec![
        Predicate::single_relationship("country", &["Country"]),
        Predicate::string("country_code"),
        Predicate::geo("location_point").not_new(),
    ])
}

fn archive() -> EntityType {
    EntityType::new("Archive").extends("Entry").predicates(vec![
        Predicate::string("description"),
        Predicate::single_choice("access", ACCESS).queryable(),
        Predicate::string("url"),
        Predicate::list_relationship("sources_included", &["Source"]).queryable(),
        Predicate::datetime("data_from"),
        Predicate::datetime("data_to"),
    ])
}

fn dataset() -> EntityType {
    EntityType::new("Dataset").extends("Archive").predicates(vec![
        Predicate::list_string("authors").queryable(),
        Predicate::list_relationship("fileformat", &["FileFormat"]).queryable(),
    ])
}

fn research_paper() -> EntityType {
    EntityType::new("ResearchPaper").extends("Entry").predicates(vec![
        Predicate::string("name")
            .label("Citation")
            .description("Generated from authors, year and title when left empty"),
        Predicate::string("title").required().queryable(),
        Predicate::list_string("authors").required().queryable(),
        Predicate::datetime("published_date").required().queryable(),
        Predicate::string("doi").queryable(),
        Predicate::string("arxiv").queryable(),
        Predicate::string("journal"),
        Predicate::string("url"),
        Predicate::list_relationship("sources_included", &["Source"]).queryable(),
    ])
}

fn file_format() -> EntityType {
    EntityType::new("FileFormat")
        .extends("Entry")
        .permission(UserRole::Reviewer)
        .predicates(vec![Predicate::string("mime_type")])
}

/// Builds the registry for the media inventory.
pub fn inventory_schema() -> Result<Schema> {
    Schema::builder()
        .register(entry())
        .register(organization())
        .register(source())
        .register(channel())
        .register(country())
        .register(multinational())
        .register(subunit())
        .register(archive())
        .register(dataset())
        .register(research_paper())
        .register(file_format())
        .build()
}
