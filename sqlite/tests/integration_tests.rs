//! Integration tests for the tabula-sqlite crate.

use tabula_core::{
    DeletePolicy, Error, FieldDecl, ForeignKey, Model, NestedOptions, NewMigration, RelationMut,
    Relations, Relationship, Result, Shape, Sqlite, Storage, TableOverride, TableSchema, Value,
    ValueType,
};
use tabula_sqlite::SqliteStorage;

#[derive(Debug, Default, Clone, PartialEq)]
struct User {
    id: i64,
    username: String,
    email: Option<String>,
    profile: Option<Profile>,
    posts: Vec<Post>,
    tags: Vec<Tag>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Profile {
    id: i64,
    user_id: Option<i64>,
    bio: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Post {
    id: i64,
    user_id: i64,
    title: String,
    author: Option<User>,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Tag {
    id: i64,
    name: String,
}

impl Model for User {
    fn shape() -> Shape {
        Shape::record(
            "User",
            vec![
                FieldDecl::new("ID", ValueType::BigInt).tag("id,pk,auto"),
                FieldDecl::new("Username", ValueType::Text).tag("username,unique,size:64"),
                FieldDecl::new("Email", ValueType::Text).tag("email,nullable"),
            ],
        )
    }
    fn table_override() -> Option<TableOverride> {
        Some(TableOverride::new("users", "id"))
    }
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "ID" => Some(self.id.into()),
            "Username" => Some(self.username.clone().into()),
            "Email" => Some(self.email.clone().into()),
            _ => None,
        }
    }
    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "ID" => self.id = value.decode()?,
            "Username" => self.username = value.decode()?,
            "Email" => self.email = value.decode()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
    fn relation(&mut self, field: &str) -> Option<RelationMut<'_>> {
        match field {
            "Profile" => Some(RelationMut::One(&mut self.profile)),
            "Posts" => Some(RelationMut::Many(&mut self.posts)),
            "Tags" => Some(RelationMut::Many(&mut self.tags)),
            _ => None,
        }
    }
}

impl Model for Profile {
    fn shape() -> Shape {
        Shape::record(
            "Profile",
            vec![
                FieldDecl::new("ID", ValueType::BigInt).tag("id,pk,auto"),
                FieldDecl::new("UserID", ValueType::BigInt).tag("user_id,nullable,index"),
                FieldDecl::new("Bio", ValueType::Text).tag("bio"),
            ],
        )
    }
    fn table_override() -> Option<TableOverride> {
        Some(TableOverride::new("profiles", "id"))
    }
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "ID" => Some(self.id.into()),
            "UserID" => Some(self.user_id.into()),
            "Bio" => Some(self.bio.clone().into()),
            _ => None,
        }
    }
    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "ID" => self.id = value.decode()?,
            "UserID" => self.user_id = value.decode()?,
            "Bio" => self.bio = value.decode()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
}

impl Model for Post {
    fn shape() -> Shape {
        Shape::record(
            "Post",
            vec![
                FieldDecl::new("ID", ValueType::BigInt).tag("id,pk,auto"),
                FieldDecl::new("UserID", ValueType::BigInt).tag("user_id,index"),
                FieldDecl::new("Title", ValueType::Text).tag("title"),
            ],
        )
    }
    fn table_override() -> Option<TableOverride> {
        Some(TableOverride::new("posts", "id"))
    }
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "ID" => Some(self.id.into()),
            "UserID" => Some(self.user_id.into()),
            "Title" => Some(self.title.clone().into()),
            _ => None,
        }
    }
    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "ID" => self.id = value.decode()?,
            "UserID" => self.user_id = value.decode()?,
            "Title" => self.title = value.decode()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
    fn relation(&mut self, field: &str) -> Option<RelationMut<'_>> {
        match field {
            "Author" => Some(RelationMut::One(&mut self.author)),
            _ => None,
        }
    }
}

impl Model for Tag {
    fn shape() -> Shape {
        Shape::record(
            "Tag",
            vec![
                FieldDecl::new("ID", ValueType::BigInt).tag("id,pk,auto"),
                FieldDecl::new("Name", ValueType::Text).tag("name,unique"),
            ],
        )
    }
    fn table_override() -> Option<TableOverride> {
        Some(TableOverride::new("tags", "id"))
    }
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "ID" => Some(self.id.into()),
            "Name" => Some(self.name.clone().into()),
            _ => None,
        }
    }
    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "ID" => self.id = value.decode()?,
            "Name" => self.name = value.decode()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
struct Country {
    code: String,
    name: String,
}

#[derive(Debug, Default, Clone, PartialEq)]
struct City {
    id: i64,
    name: String,
    country_code: String,
    country: Option<Country>,
}

impl Model for Country {
    fn shape() -> Shape {
        Shape::record(
            "Country",
            vec![
                FieldDecl::new("Code", ValueType::Text).tag("code,pk,size:2"),
                FieldDecl::new("Name", ValueType::Text).tag("name"),
            ],
        )
    }
    fn table_override() -> Option<TableOverride> {
        Some(TableOverride::new("countries", "code"))
    }
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "Code" => Some(self.code.clone().into()),
            "Name" => Some(self.name.clone().into()),
            _ => None,
        }
    }
    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "Code" => self.code = value.decode()?,
            "Name" => self.name = value.decode()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
}

impl Model for City {
    fn shape() -> Shape {
        Shape::record(
            "City",
            vec![
                FieldDecl::new("ID", ValueType::BigInt).tag("id,pk,auto"),
                FieldDecl::new("Name", ValueType::Text).tag("name"),
                FieldDecl::new("CountryCode", ValueType::Text).tag("country_code,size:2"),
            ],
        )
    }
    fn table_override() -> Option<TableOverride> {
        Some(TableOverride::new("cities", "id"))
    }
    fn get(&self, field: &str) -> Option<Value> {
        match field {
            "ID" => Some(self.id.into()),
            "Name" => Some(self.name.clone().into()),
            "CountryCode" => Some(self.country_code.clone().into()),
            _ => None,
        }
    }
    fn set(&mut self, field: &str, value: Value) -> Result<()> {
        match field {
            "ID" => self.id = value.decode()?,
            "Name" => self.name = value.decode()?,
            "CountryCode" => self.country_code = value.decode()?,
            _ => return Err(Self::unknown_field(field)),
        }
        Ok(())
    }
    fn relation(&mut self, field: &str) -> Option<RelationMut<'_>> {
        match field {
            "Country" => Some(RelationMut::One(&mut self.country)),
            _ => None,
        }
    }
}

const USER_TAGS: &str = "CREATE TABLE user_tags (
    user_id INTEGER NOT NULL REFERENCES users (id),
    tag_id INTEGER NOT NULL REFERENCES tags (id),
    PRIMARY KEY (user_id, tag_id)
)";

/// Opens an in-memory database with the test tables.
fn setup() -> SqliteStorage {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let schemas = vec![
        TableSchema::from_descriptor(User::descriptor().unwrap()),
        TableSchema::from_descriptor(Profile::descriptor().unwrap())
            .with_foreign_key(ForeignKey::new("user_id", "users", "id"))
            .unwrap(),
        TableSchema::from_descriptor(Post::descriptor().unwrap())
            .with_foreign_key(ForeignKey::new("user_id", "users", "id"))
            .unwrap(),
        TableSchema::from_descriptor(Tag::descriptor().unwrap()),
    ];
    for schema in &schemas {
        storage.execute_script(&schema.create_table_sql(&Sqlite)).unwrap();
        for index in schema.create_index_statements(&Sqlite) {
            storage.execute_script(&index).unwrap();
        }
    }
    storage.execute_script(USER_TAGS).unwrap();
    storage
}

fn relations() -> Relations {
    Relations::of::<User>()
        .unwrap()
        .with("Posts", Relationship::has_many::<Post>("user_id", "id").unwrap())
        .unwrap()
        .with("Profile", Relationship::has_one::<Profile>("user_id", "id").unwrap())
        .unwrap()
        .with(
            "Tags",
            Relationship::many_to_many::<Tag>("user_tags", "user_id", "tag_id").unwrap(),
        )
        .unwrap()
}

fn tags_relationship() -> Relationship {
    Relationship::many_to_many::<Tag>("user_tags", "user_id", "tag_id").unwrap()
}

fn count(storage: &SqliteStorage, sql: &str, args: &[Value]) -> i64 {
    storage.query(sql, args).unwrap()[0]
        .value(0)
        .cloned()
        .unwrap()
        .decode()
        .unwrap()
}

fn new_user(name: &str) -> User {
    User {
        username: name.to_string(),
        ..User::default()
    }
}

// ---------------------------------------------------------------------------
// Record CRUD
// ---------------------------------------------------------------------------

#[test]
fn test_create_then_find_roundtrip() {
    let storage = setup();
    let session = storage.session();

    let mut created = User {
        username: "jdoe".into(),
        email: Some("jdoe@example.com".into()),
        ..User::default()
    };
    session.create(&mut created).unwrap();
    assert!(created.id > 0);

    let mut loaded = User::default();
    session.find(&mut loaded, created.id).unwrap();
    assert_eq!(loaded, created);
}

#[test]
fn test_find_missing_is_not_found() {
    let storage = setup();
    let err = storage.session().find(&mut User::default(), 404i64).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_update_missing_and_keyless() {
    let storage = setup();
    let session = storage.session();

    let mut ghost = User {
        id: 77,
        username: "ghost".into(),
        ..User::default()
    };
    assert!(session.update(&mut ghost).unwrap_err().is_not_found());

    let mut keyless = new_user("keyless");
    assert!(matches!(
        session.update(&mut keyless).unwrap_err(),
        Error::MissingKey { .. }
    ));
}

#[test]
fn test_update_and_delete() {
    let storage = setup();
    let session = storage.session();

    let mut user = new_user("before");
    session.create(&mut user).unwrap();
    user.username = "after".into();
    user.email = Some("a@b.c".into());
    session.update(&mut user).unwrap();

    let mut loaded = User::default();
    session.find(&mut loaded, user.id).unwrap();
    assert_eq!(loaded.username, "after");
    assert_eq!(loaded.email.as_deref(), Some("a@b.c"));

    session.delete(&user).unwrap();
    assert!(session.delete(&user).unwrap_err().is_not_found());
}

#[test]
fn test_first_all_and_count() {
    let storage = setup();
    let session = storage.session();
    for name in ["amy", "bob", "cat"] {
        session.create(&mut new_user(name)).unwrap();
    }

    let mut bob = User::default();
    session
        .first(&mut bob, "\"username\" = ?", &[Value::from("bob")])
        .unwrap();
    assert_eq!(bob.username, "bob");

    let mut users: Vec<User> = Vec::new();
    session.all(&mut users, "\"username\" <> ?", &[Value::from("bob")]).unwrap();
    assert_eq!(
        users.iter().map(|u| u.username.as_str()).collect::<Vec<_>>(),
        vec!["amy", "cat"]
    );

    assert_eq!(session.count::<User>("", &[]).unwrap(), 3);
    assert_eq!(
        session
            .count::<User>("\"username\" LIKE ?", &[Value::from("%a%")])
            .unwrap(),
        2
    );
}

#[test]
fn test_unique_violation_is_storage_error() {
    let storage = setup();
    let session = storage.session();
    session.create(&mut new_user("dup")).unwrap();
    let err = session.create(&mut new_user("dup")).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}

#[test]
fn test_transaction_block_rolls_back() {
    let storage = setup();
    let session = storage.session();

    let result: Result<()> = session.transaction(|tx| {
        tx.create(&mut new_user("temp"))?;
        Err(Error::Usage("abort".into()))
    });
    assert!(result.is_err());
    assert_eq!(session.count::<User>("", &[]).unwrap(), 0);
    assert!(!storage.in_transaction());

    session
        .transaction(|tx| tx.create(&mut new_user("kept")))
        .unwrap();
    assert_eq!(session.count::<User>("", &[]).unwrap(), 1);
}

#[test]
fn test_list_tables_and_exists() {
    let storage = setup();
    let session = storage.session();
    let tables = session.list_tables().unwrap();
    for table in ["users", "profiles", "posts", "tags", "user_tags"] {
        assert!(tables.iter().any(|t| t == table), "missing {table}");
    }
    assert!(session.table_exists("posts").unwrap());
    assert!(!session.table_exists("comments").unwrap());
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

#[test]
fn test_has_many_without_children_is_empty() {
    let storage = setup();
    let session = storage.session();
    let mut user = new_user("lonely");
    session.create(&mut user).unwrap();

    session.preload(&mut user, &relations().only(&["Posts"])).unwrap();
    assert!(user.posts.is_empty());
}

#[test]
fn test_preload_all_kinds() {
    let storage = setup();
    let session = storage.session();

    let mut user = new_user("jdoe");
    session.create(&mut user).unwrap();
    for title in ["one", "two"] {
        session
            .create(&mut Post {
                user_id: user.id,
                title: title.into(),
                ..Post::default()
            })
            .unwrap();
    }
    session
        .create(&mut Profile {
            user_id: Some(user.id),
            bio: "hi".into(),
            ..Profile::default()
        })
        .unwrap();
    let mut tag = Tag {
        name: "rust".into(),
        ..Tag::default()
    };
    session.create(&mut tag).unwrap();
    session.associate(&user, &tag, &tags_relationship()).unwrap();

    let mut loaded = User::default();
    session.find_with(&mut loaded, user.id, &relations()).unwrap();
    assert_eq!(
        loaded.posts.iter().map(|p| p.title.as_str()).collect::<Vec<_>>(),
        vec!["one", "two"]
    );
    assert_eq!(loaded.profile.as_ref().map(|p| p.bio.as_str()), Some("hi"));
    assert_eq!(loaded.tags, vec![tag]);

    let author = Relations::of::<Post>()
        .unwrap()
        .with("Author", Relationship::belongs_to::<User>("user_id", "id").unwrap())
        .unwrap();
    let mut posts: Vec<Post> = Vec::new();
    session.all_with(&mut posts, "", &[], &author).unwrap();
    assert_eq!(posts.len(), 2);
    assert!(posts
        .iter()
        .all(|p| p.author.as_ref().map(|a| a.username.as_str()) == Some("jdoe")));
}

#[test]
fn test_associate_dissociate_touches_only_pair() {
    let storage = setup();
    let session = storage.session();
    let rel = tags_relationship();

    let mut amy = new_user("amy");
    let mut bob = new_user("bob");
    session.create(&mut amy).unwrap();
    session.create(&mut bob).unwrap();
    let mut rust = Tag {
        name: "rust".into(),
        ..Tag::default()
    };
    let mut sql = Tag {
        name: "sql".into(),
        ..Tag::default()
    };
    session.create(&mut rust).unwrap();
    session.create(&mut sql).unwrap();

    session.associate(&amy, &rust, &rel).unwrap();
    session.associate(&amy, &sql, &rel).unwrap();
    session.associate(&bob, &rust, &rel).unwrap();

    session.dissociate(&amy, &rust, &rel).unwrap();

    let remaining = storage
        .query("SELECT user_id, tag_id FROM user_tags ORDER BY user_id, tag_id", &[])
        .unwrap()
        .iter()
        .map(|row| (row.decode::<i64>("user_id").unwrap(), row.decode::<i64>("tag_id").unwrap()))
        .collect::<Vec<_>>();
    assert_eq!(remaining, vec![(amy.id, sql.id), (bob.id, rust.id)]);
}

#[test]
fn test_associate_rejects_non_join_relationship() {
    let storage = setup();
    let session = storage.session();
    let rel = Relationship::has_many::<Post>("user_id", "id").unwrap();
    let user = User {
        id: 1,
        ..User::default()
    };
    let post = Post {
        id: 1,
        ..Post::default()
    };
    assert!(matches!(
        session.associate(&user, &post, &rel).unwrap_err(),
        Error::Usage(_)
    ));
}

// ---------------------------------------------------------------------------
// Nested persistence
// ---------------------------------------------------------------------------

fn full_user() -> User {
    User {
        username: "nested".into(),
        profile: Some(Profile {
            bio: "about me".into(),
            ..Profile::default()
        }),
        posts: vec![
            Post {
                title: "first".into(),
                ..Post::default()
            },
            Post {
                title: "second".into(),
                ..Post::default()
            },
        ],
        tags: vec![
            Tag {
                name: "rust".into(),
                ..Tag::default()
            },
            Tag {
                name: "sql".into(),
                ..Tag::default()
            },
        ],
        ..User::default()
    }
}

#[test]
fn test_create_nested_persists_graph() {
    let storage = setup();
    let session = storage.session();

    let mut user = full_user();
    let journal = session
        .create_nested(&mut user, &relations(), &NestedOptions::default())
        .unwrap();
    assert_eq!(journal.len(), 8);

    let id = Value::Int(user.id);
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM posts WHERE user_id = ?", &[id.clone()]), 2);
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM profiles WHERE user_id = ?", &[id.clone()]), 1);
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM user_tags WHERE user_id = ?", &[id]), 2);

    let mut loaded = User::default();
    session.find_with(&mut loaded, user.id, &relations()).unwrap();
    let mut names: Vec<_> = loaded.tags.iter().map(|t| t.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["rust", "sql"]);
    assert_eq!(loaded.posts.len(), 2);
}

#[test]
fn test_create_nested_failure_leaves_nothing() {
    let storage = setup();
    let session = storage.session();

    let mut user = full_user();
    user.tags[1].name = "rust".into();
    let err = session
        .create_nested(&mut user, &relations(), &NestedOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));

    assert_eq!(count(&storage, "SELECT COUNT(*) FROM users", &[]), 0);
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM posts", &[]), 0);
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM tags", &[]), 0);
    assert!(!storage.in_transaction());
}

#[test]
fn test_create_nested_belongs_to_satisfies_foreign_key() {
    let storage = setup();
    let session = storage.session();

    let author = Relations::of::<Post>()
        .unwrap()
        .with("Author", Relationship::belongs_to::<User>("user_id", "id").unwrap())
        .unwrap();
    let mut post = Post {
        title: "hello".into(),
        author: Some(new_user("writer")),
        ..Post::default()
    };
    session
        .create_nested(&mut post, &author, &NestedOptions::default())
        .unwrap();

    let writer_id = post.author.as_ref().map(|a| a.id).unwrap();
    assert_eq!(post.user_id, writer_id);
    let mut loaded = Post::default();
    session.find(&mut loaded, post.id).unwrap();
    assert_eq!(loaded.user_id, writer_id);
}

#[test]
fn test_create_nested_inserts_owner_with_natural_key() {
    let storage = setup();
    for schema in [
        TableSchema::from_descriptor(Country::descriptor().unwrap()),
        TableSchema::from_descriptor(City::descriptor().unwrap())
            .with_foreign_key(ForeignKey::new("country_code", "countries", "code"))
            .unwrap(),
    ] {
        storage.execute_script(&schema.create_table_sql(&Sqlite)).unwrap();
    }
    let session = storage.session();

    let country = Relations::of::<City>()
        .unwrap()
        .with("Country", Relationship::belongs_to::<Country>("country_code", "code").unwrap())
        .unwrap();
    let mut city = City {
        name: "Oslo".into(),
        country: Some(Country {
            code: "NO".into(),
            name: "Norway".into(),
        }),
        ..City::default()
    };
    session
        .create_nested(&mut city, &country, &NestedOptions::default())
        .unwrap();

    // A keyed owner is still new in create mode.
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM countries", &[]), 1);
    assert_eq!(city.country_code, "NO");
    let mut loaded = City::default();
    session.find(&mut loaded, city.id).unwrap();
    assert_eq!(loaded.country_code, "NO");
}

#[test]
fn test_update_nested_upserts_and_prunes() {
    let storage = setup();
    let session = storage.session();

    let mut user = full_user();
    session
        .create_nested(&mut user, &relations(), &NestedOptions::default())
        .unwrap();
    let removed = user.tags.remove(0);

    user.username = "renamed".into();
    user.posts[0].title = "edited".into();
    user.posts.push(Post {
        title: "third".into(),
        ..Post::default()
    });
    user.tags.push(Tag {
        name: "db".into(),
        ..Tag::default()
    });

    let options = NestedOptions::default().prune_associations(true);
    session.update_nested(&mut user, &relations(), &options).unwrap();

    let mut loaded = User::default();
    session.find_with(&mut loaded, user.id, &relations()).unwrap();
    assert_eq!(loaded.username, "renamed");
    assert_eq!(
        loaded.posts.iter().map(|p| p.title.as_str()).collect::<Vec<_>>(),
        vec!["edited", "second", "third"]
    );
    let mut names: Vec<_> = loaded.tags.iter().map(|t| t.name.clone()).collect();
    names.sort();
    assert_eq!(names, vec!["db", "sql"]);

    // Pruning removes the join row, not the tag itself.
    let mut tag = Tag::default();
    session.find(&mut tag, removed.id).unwrap();
    assert_eq!(tag.name, "rust");
}

#[test]
fn test_update_nested_without_prune_keeps_links() {
    let storage = setup();
    let session = storage.session();

    let mut user = full_user();
    session
        .create_nested(&mut user, &relations(), &NestedOptions::default())
        .unwrap();
    user.tags.clear();
    session
        .update_nested(&mut user, &relations(), &NestedOptions::default())
        .unwrap();
    assert_eq!(
        count(&storage, "SELECT COUNT(*) FROM user_tags WHERE user_id = ?", &[Value::Int(user.id)]),
        2
    );
}

#[test]
fn test_delete_nested_cascade_removes_children_and_related() {
    let storage = setup();
    let session = storage.session();

    let mut user = full_user();
    session
        .create_nested(&mut user, &relations(), &NestedOptions::default())
        .unwrap();

    let options = NestedOptions::default().on_delete(DeletePolicy::Cascade { delete_related: true });
    session.delete_nested(&user, &relations(), &options).unwrap();

    for table in ["users", "posts", "profiles", "user_tags", "tags"] {
        assert_eq!(count(&storage, &format!("SELECT COUNT(*) FROM {table}"), &[]), 0, "{table}");
    }
}

#[test]
fn test_delete_nested_nullify_keeps_children() {
    let storage = setup();
    let session = storage.session();

    let mut user = full_user();
    user.posts.clear();
    session
        .create_nested(&mut user, &relations(), &NestedOptions::default())
        .unwrap();

    let options = NestedOptions::default().on_delete(DeletePolicy::Nullify);
    session.delete_nested(&user, &relations(), &options).unwrap();

    assert_eq!(count(&storage, "SELECT COUNT(*) FROM users", &[]), 0);
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM profiles WHERE user_id IS NULL", &[]), 1);
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM user_tags", &[]), 0);
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM tags", &[]), 2);
}

#[test]
fn test_delete_nested_skip_with_children_fails_atomically() {
    let storage = setup();
    let session = storage.session();

    let mut user = full_user();
    session
        .create_nested(&mut user, &relations(), &NestedOptions::default())
        .unwrap();

    let err = session
        .delete_nested(&user, &relations(), &NestedOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM users", &[]), 1);
}

// ---------------------------------------------------------------------------
// Migrations
// ---------------------------------------------------------------------------

fn register_two(storage: &SqliteStorage) {
    let manager = storage.migrations("migrations").unwrap();
    manager
        .register(
            NewMigration::new(
                "001_create_widgets",
                "CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            )
            .description("widgets table")
            .down("DROP TABLE widgets"),
        )
        .unwrap();
    manager
        .register(
            NewMigration::new(
                "002_seed_widgets",
                "INSERT INTO widgets (name) VALUES ('a'); INSERT INTO widgets (name) VALUES ('b');",
            )
            .down("DELETE FROM widgets"),
        )
        .unwrap();
}

#[test]
fn test_migrate_up_is_idempotent() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    register_two(&storage);
    let manager = storage.migrations("migrations").unwrap();

    let applied = manager.migrate_up().unwrap();
    assert_eq!(applied, vec!["001_create_widgets", "002_seed_widgets"]);
    let first = manager.status().unwrap();
    assert_eq!((first.applied, first.pending), (2, 0));

    assert!(manager.migrate_up().unwrap().is_empty());
    let second = manager.status().unwrap();
    assert_eq!(
        first.migrations.iter().map(|m| m.applied_at).collect::<Vec<_>>(),
        second.migrations.iter().map(|m| m.applied_at).collect::<Vec<_>>()
    );
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM widgets", &[]), 2);
}

#[test]
fn test_migrate_up_failure_rolls_back_whole_run() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    register_two(&storage);
    let manager = storage.migrations("migrations").unwrap();
    manager
        .register(NewMigration::new("003_broken", "INSERT INTO nowhere VALUES (1)"))
        .unwrap();

    let err = manager.migrate_up().unwrap_err();
    match err {
        Error::Migration { ref name, .. } => assert_eq!(name, "003_broken"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(manager.status().unwrap().applied, 0);
    assert!(!storage.session().table_exists("widgets").unwrap());
}

#[test]
fn test_migrate_down_and_rollback() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    register_two(&storage);
    let manager = storage.migrations("migrations").unwrap();
    manager.migrate_up().unwrap();

    let reverted = manager.migrate_down().unwrap();
    assert_eq!(reverted.name, "002_seed_widgets");
    assert_eq!(count(&storage, "SELECT COUNT(*) FROM widgets", &[]), 0);

    let reverted = manager.rollback(1).unwrap();
    assert_eq!(reverted[0].name, "001_create_widgets");
    assert!(!storage.session().table_exists("widgets").unwrap());

    assert!(matches!(manager.migrate_down().unwrap_err(), Error::NoMigrations));
    assert_eq!(manager.pending().unwrap().len(), 2);
}

#[test]
fn test_register_refreshes_pending_scripts() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let manager = storage.migrations("schema_log").unwrap();
    let first = manager
        .register(NewMigration::new("001_t", "CREATE TABLE t (a INTEGER)"))
        .unwrap();
    let second = manager
        .register(NewMigration::new("001_t", "CREATE TABLE t (a INTEGER, b TEXT)"))
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(second.up, "CREATE TABLE t (a INTEGER, b TEXT)");
    assert_eq!(manager.migrations().unwrap().len(), 1);
    assert!(storage.session().table_exists("schema_log").unwrap());
}

#[test]
fn test_ledger_persists_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    {
        let storage = SqliteStorage::open(&path).unwrap();
        register_two(&storage);
        storage.migrations("migrations").unwrap().migrate_up().unwrap();
    }

    let storage = SqliteStorage::open(&path).unwrap();
    let status = storage.migrations("migrations").unwrap().status().unwrap();
    assert_eq!(status.applied, 2);
    assert!(status.migrations.iter().all(|m| m.applied_at.is_some()));
}
