pub mod alias_naming;
